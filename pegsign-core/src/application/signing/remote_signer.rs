//! Signer backend talking to the remote signer device.

use crate::application::signing::client::SigningClient;
use crate::application::signing::factory::{create_signing_client, ensure_supported};
use crate::domain::signing::{CheckResult, ListenerSet, SignEnvelope, Signer, SignerListener, SignerSignature};
use crate::foundation::{BridgeError, KeyId, ProtocolVersion, Result};
use crate::infrastructure::signer::SignerProtocol;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct RemoteSigner {
    name: String,
    protocol: Arc<SignerProtocol>,
    /// Logical key id to the identifier the device knows the key by.
    keys: BTreeMap<KeyId, String>,
    client: Mutex<Option<Arc<dyn SigningClient>>>,
    listeners: ListenerSet,
    client_resets: AtomicUsize,
}

impl RemoteSigner {
    pub fn new(name: impl Into<String>, protocol: Arc<SignerProtocol>, keys: BTreeMap<KeyId, String>) -> Self {
        Self {
            name: name.into(),
            protocol,
            keys,
            client: Mutex::new(None),
            listeners: ListenerSet::new(),
            client_resets: AtomicUsize::new(0),
        }
    }

    pub fn remote_key_id(&self, key_id: &KeyId) -> Result<&str> {
        self.keys.get(key_id).map(String::as_str).ok_or_else(|| BridgeError::NoSuitableSigner(key_id.to_string()))
    }

    /// Times the cached client was replaced after a version change.
    pub fn client_resets(&self) -> usize {
        self.client_resets.load(Ordering::Acquire)
    }

    /// Cached client for the protocol's current version.
    ///
    /// The protocol version is shared with bookkeeping, which may renegotiate it first; a cached
    /// client built for another version is replaced.
    async fn client(&self) -> Result<Arc<dyn SigningClient>> {
        let mut cached = self.client.lock().await;
        let version = match self.protocol.version() {
            Some(version) => version,
            None => self.protocol.negotiate().await?,
        };
        if let Some(client) = cached.as_ref() {
            if client.version() == version {
                return Ok(Arc::clone(client));
            }
            info!("remote signing client outdated signer={} cached={} current={}", self.name, client.version(), version);
            self.client_resets.fetch_add(1, Ordering::AcqRel);
        }
        let client = create_signing_client(Arc::clone(&self.protocol), version)?;
        debug!("remote signing client created signer={} version={}", self.name, version);
        *cached = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn invalidate(&self) {
        *self.client.lock().await = None;
        self.protocol.clear_version();
        self.client_resets.fetch_add(1, Ordering::AcqRel);
    }

    fn report(&self, err: BridgeError) -> BridgeError {
        if err.is_irrecoverable() {
            warn!("remote signer failure signer={} error={}", self.name, err);
            self.listeners.notify(&self.name, &err);
        }
        err
    }

    /// Runs `op` against the cached client; a version change drops the client and retries once.
    async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn SigningClient>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let client = self.client().await.map_err(|err| self.report(err))?;
        match op(client).await {
            Err(err) if err.is_version_changed() => {
                info!("remote signer version changed; renegotiating signer={} operation={}", self.name, operation);
                self.invalidate().await;
                let client = self.client().await.map_err(|err| self.report(err))?;
                op(client).await.map_err(|err| self.report(err))
            }
            other => other.map_err(|err| self.report(err)),
        }
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_sign_with(&self, key_id: &KeyId) -> bool {
        self.keys.contains_key(key_id)
    }

    async fn check(&self) -> CheckResult {
        let client = match self.client().await {
            Ok(client) => client,
            Err(err) => return CheckResult::failed(format!("{}: cannot negotiate version: {}", self.name, err)),
        };
        let mut result = CheckResult::ok();
        for (key_id, remote_key_id) in &self.keys {
            if let Err(err) = ensure_supported(client.version(), key_id) {
                result.fail(format!("{}: {}", self.name, err));
                continue;
            }
            if let Err(err) = client.get_public_key(remote_key_id).await {
                result.fail(format!("{}: key {} ({}) unavailable: {}", self.name, key_id, remote_key_id, err));
            }
        }
        result
    }

    async fn version_for_key_id(&self, key_id: &KeyId) -> Result<ProtocolVersion> {
        self.remote_key_id(key_id)?;
        let client = self.client().await.map_err(|err| self.report(err))?;
        Ok(client.version())
    }

    async fn public_key(&self, key_id: &KeyId) -> Result<Vec<u8>> {
        let remote_key_id = self.remote_key_id(key_id)?;
        self.call("public_key", |client| async move { client.get_public_key(remote_key_id).await }).await
    }

    async fn sign(&self, key_id: &KeyId, envelope: &SignEnvelope) -> Result<SignerSignature> {
        let remote_key_id = self.remote_key_id(key_id)?;
        self.call("sign", |client| async move { client.sign(remote_key_id, envelope).await }).await
    }

    fn add_listener(&self, listener: Arc<dyn SignerListener>) {
        self.listeners.add(listener);
    }
}
