//! Verifies at startup that every configured key can be served by the signer stack.

use crate::application::bookkeeping::BookkeepingClient;
use crate::application::signing::ensure_supported;
use crate::domain::pointer::ChainParameters;
use crate::domain::signing::Signer;
use crate::foundation::{BridgeError, KeyId, ProtocolVersion, Result};
use crate::infrastructure::config::Network;
use log::{info, warn};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyReport {
    pub key_id: KeyId,
    pub version: ProtocolVersion,
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub keys: Vec<KeyReport>,
    /// Chain parameters reported by the remote signer, when it speaks bookkeeping.
    pub parameters: Option<ChainParameters>,
}

pub struct SignerStartupCheck {
    signer: Arc<dyn Signer>,
    bookkeeping: Option<Arc<BookkeepingClient>>,
    key_ids: Vec<KeyId>,
    network: Network,
}

impl SignerStartupCheck {
    pub fn new(signer: Arc<dyn Signer>, bookkeeping: Option<Arc<BookkeepingClient>>, key_ids: Vec<KeyId>, network: Network) -> Self {
        Self { signer, bookkeeping, key_ids, network }
    }

    pub async fn run(&self) -> Result<StartupReport> {
        let check = self.signer.check().await;
        for message in &check.messages {
            if check.ok {
                info!("signer check: {}", message);
            } else {
                warn!("signer check: {}", message);
            }
        }
        if !check.ok {
            return Err(BridgeError::ConfigError(format!("signer check failed: {}", check.messages.join("; "))));
        }

        let mut report = StartupReport::default();
        for key_id in &self.key_ids {
            if !self.signer.can_sign_with(key_id) {
                return Err(BridgeError::NoSuitableSigner(key_id.to_string()));
            }
            let version = self.signer.version_for_key_id(key_id).await?;
            ensure_supported(version, key_id)?;
            let public_key = self.signer.public_key(key_id).await?;
            info!("signer key ready key_id={} version={} public_key={}", key_id, version, hex::encode(&public_key));
            report.keys.push(KeyReport { key_id: key_id.clone(), version, public_key });
        }

        let bookkeeping_capable = report.keys.iter().any(|key| key.version.supports_bookkeeping());
        if let (Some(client), true) = (&self.bookkeeping, bookkeeping_capable) {
            let parameters = client.get_chain_parameters().await?;
            if parameters.network != self.network.as_str() {
                return Err(BridgeError::ConfigError(format!(
                    "remote signer is provisioned for network '{}' but the bridge runs on '{}'",
                    parameters.network, self.network
                )));
            }
            info!(
                "remote signer chain parameters network={} checkpoint={} minimum_difficulty={}",
                parameters.network, parameters.checkpoint, parameters.minimum_difficulty
            );
            report.parameters = Some(parameters);
        }
        Ok(report)
    }
}
