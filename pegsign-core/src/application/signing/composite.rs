//! Routes logical key ids to the first backend that accepts them.

use crate::domain::signing::{CheckResult, ListenerSet, SignEnvelope, SignRequest, Signer, SignerListener, SignerSignature};
use crate::foundation::{BridgeError, KeyId, ProtocolVersion, Result};
use async_trait::async_trait;
use log::{debug, trace};
use std::sync::Arc;

pub struct CompositeSigner {
    signers: Vec<Arc<dyn Signer>>,
    listeners: ListenerSet,
}

impl CompositeSigner {
    /// Backends are consulted in registration order. Their failures reach this composite's
    /// listeners, including listeners added later.
    pub fn new(signers: Vec<Arc<dyn Signer>>) -> Self {
        let listeners = ListenerSet::new();
        for signer in &signers {
            signer.add_listener(Arc::new(listeners.clone()));
        }
        Self { signers, listeners }
    }

    pub fn signers(&self) -> &[Arc<dyn Signer>] {
        &self.signers
    }

    fn signer_for(&self, key_id: &KeyId) -> Result<&Arc<dyn Signer>> {
        let signer = self
            .signers
            .iter()
            .find(|signer| signer.can_sign_with(key_id))
            .ok_or_else(|| BridgeError::NoSuitableSigner(key_id.to_string()))?;
        trace!("routing key_id={} signer={}", key_id, signer.name());
        Ok(signer)
    }

    pub async fn sign_request(&self, request: &SignRequest) -> Result<SignerSignature> {
        self.sign(&request.key_id, &request.envelope).await
    }
}

#[async_trait]
impl Signer for CompositeSigner {
    fn name(&self) -> &str {
        "composite"
    }

    fn can_sign_with(&self, key_id: &KeyId) -> bool {
        self.signers.iter().any(|signer| signer.can_sign_with(key_id))
    }

    async fn check(&self) -> CheckResult {
        let mut result = CheckResult::ok();
        for signer in &self.signers {
            let check = signer.check().await;
            debug!("signer check signer={} ok={}", signer.name(), check.ok);
            result = result.merge(check);
        }
        result
    }

    async fn version_for_key_id(&self, key_id: &KeyId) -> Result<ProtocolVersion> {
        self.signer_for(key_id)?.version_for_key_id(key_id).await
    }

    async fn public_key(&self, key_id: &KeyId) -> Result<Vec<u8>> {
        self.signer_for(key_id)?.public_key(key_id).await
    }

    async fn sign(&self, key_id: &KeyId, envelope: &SignEnvelope) -> Result<SignerSignature> {
        self.signer_for(key_id)?.sign(key_id, envelope).await
    }

    fn add_listener(&self, listener: Arc<dyn SignerListener>) {
        self.listeners.add(listener);
    }
}
