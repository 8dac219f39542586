//! Wires the signer stack and bookkeeping from configuration.

use crate::application::ancestor::AncestorReconciler;
use crate::application::bookkeeping::{BookkeepingClient, BookkeepingService, BookkeepingSettings};
use crate::application::lifecycle::BookkeepingLifecycle;
use crate::application::pegout::PegoutSigner;
use crate::application::signing::{CompositeSigner, RemoteSigner};
use crate::application::startup::SignerStartupCheck;
use crate::domain::chain::{ChainStore, ReceiptProofStore};
use crate::domain::signing::Signer;
use crate::foundation::{BridgeError, KeyId, Result};
use crate::infrastructure::config::{default_remote_key_id, AppConfig, KeyConfig};
use crate::infrastructure::keys::KeyFileSigner;
use crate::infrastructure::signer::{ConnectionPool, SignerProtocol, TcpConnectionPool};
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct BridgeContext {
    pub config: AppConfig,
    pub protocol: Arc<SignerProtocol>,
    pub signer: Arc<CompositeSigner>,
    pub bookkeeping_client: Arc<BookkeepingClient>,
    pub bookkeeping: Arc<BookkeepingService>,
    pub reconciler: Arc<AncestorReconciler>,
    pub pegout: PegoutSigner,
    pub lifecycle: BookkeepingLifecycle,
    has_remote_keys: bool,
}

impl BridgeContext {
    /// Builds the context over a TCP connection pool to the configured remote signer.
    pub fn connect(config: AppConfig, chain: Arc<dyn ChainStore>, receipts: Arc<dyn ReceiptProofStore>) -> Result<Self> {
        let signer = &config.signer;
        let pool: Arc<dyn ConnectionPool> = Arc::new(TcpConnectionPool::new(signer.addr(), signer.socket_timeout(), signer.pool_size));
        Self::build(config, pool, chain, receipts)
    }

    pub fn build(
        config: AppConfig,
        pool: Arc<dyn ConnectionPool>,
        chain: Arc<dyn ChainStore>,
        receipts: Arc<dyn ReceiptProofStore>,
    ) -> Result<Self> {
        config.validate().map_err(|errors| BridgeError::ConfigError(format!("validation failed: {:?}", errors)))?;

        let protocol = Arc::new(SignerProtocol::new(pool, config.signer.max_attempts, config.signer.interval()));

        let mut remote_keys = BTreeMap::new();
        let mut signers: Vec<Arc<dyn Signer>> = Vec::new();
        let mut key_file_signers: Vec<Arc<dyn Signer>> = Vec::new();
        for key in &config.keys {
            match key {
                KeyConfig::Remote { key_id, remote_key_id } => {
                    let remote_key_id = match remote_key_id {
                        Some(id) => id.clone(),
                        None => default_remote_key_id(config.network, key_id)
                            .ok_or_else(|| BridgeError::ConfigError(format!("no remote key id for key {}", key_id)))?
                            .to_string(),
                    };
                    remote_keys.insert(key_id.clone(), remote_key_id);
                }
                KeyConfig::KeyFile { key_id, path } => {
                    key_file_signers.push(Arc::new(KeyFileSigner::new(key_id.clone(), path)));
                }
            }
        }
        let has_remote_keys = !remote_keys.is_empty();
        if has_remote_keys {
            let name = format!("remote:{}", config.signer.addr());
            signers.push(Arc::new(RemoteSigner::new(name, Arc::clone(&protocol), remote_keys)));
        }
        signers.extend(key_file_signers);
        let signer = Arc::new(CompositeSigner::new(signers));

        let bookkeeping_client = Arc::new(BookkeepingClient::new(Arc::clone(&protocol), config.bookkeeping.max_chunk_size));
        let bookkeeping = Arc::new(BookkeepingService::new(
            Arc::clone(&bookkeeping_client),
            Arc::clone(&chain),
            BookkeepingSettings::from(&config.bookkeeping),
        ));
        let reconciler = Arc::new(AncestorReconciler::new(Arc::clone(&bookkeeping_client), chain));
        let pegout = PegoutSigner::new(signer.clone(), Arc::clone(&reconciler), receipts);
        let lifecycle = BookkeepingLifecycle::new(Arc::clone(&bookkeeping));

        info!(
            "bridge context ready network={} signer={} keys={} remote_keys={}",
            config.network,
            config.signer.addr(),
            config.keys.len(),
            has_remote_keys
        );
        Ok(Self { config, protocol, signer, bookkeeping_client, bookkeeping, reconciler, pegout, lifecycle, has_remote_keys })
    }

    pub fn key_ids(&self) -> Vec<KeyId> {
        self.config.keys.iter().map(|key| key.key_id().clone()).collect()
    }

    pub fn startup_check(&self) -> SignerStartupCheck {
        let bookkeeping = self.has_remote_keys.then(|| Arc::clone(&self.bookkeeping_client));
        SignerStartupCheck::new(self.signer.clone(), bookkeeping, self.key_ids(), self.config.network)
    }
}
