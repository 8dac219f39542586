use crate::domain::signing::{CheckResult, SignEnvelope, SignerSignature};
use crate::foundation::{BridgeError, KeyId, ProtocolVersion, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Notified when a signer backend hits a failure that needs operator attention.
pub trait SignerListener: Send + Sync {
    fn on_irrecoverable_error(&self, _signer: &str, _err: &BridgeError) {}
}

pub struct NoopSignerListener;

impl SignerListener for NoopSignerListener {}

/// Shared, append-only fan-out of listeners.
///
/// Cloning yields a handle to the same set, so a composite can hand it to each backend and
/// listeners added later still reach every backend.
#[derive(Clone, Default)]
pub struct ListenerSet {
    listeners: Arc<RwLock<Vec<Arc<dyn SignerListener>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn SignerListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, signer: &str, err: &BridgeError) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_irrecoverable_error(signer, err);
        }
    }
}

impl SignerListener for ListenerSet {
    fn on_irrecoverable_error(&self, signer: &str, err: &BridgeError) {
        self.notify(signer, err);
    }
}

/// A signing backend: a remote signer, a local key file, or a composite of several.
#[async_trait]
pub trait Signer: Send + Sync {
    fn name(&self) -> &str;

    fn can_sign_with(&self, key_id: &KeyId) -> bool;

    async fn check(&self) -> CheckResult;

    async fn version_for_key_id(&self, key_id: &KeyId) -> Result<ProtocolVersion>;

    async fn public_key(&self, key_id: &KeyId) -> Result<Vec<u8>>;

    async fn sign(&self, key_id: &KeyId, envelope: &SignEnvelope) -> Result<SignerSignature>;

    fn add_listener(&self, listener: Arc<dyn SignerListener>);
}
