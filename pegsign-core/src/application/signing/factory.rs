use crate::application::signing::client::{HashSigningClient, PowSigningClient, SigningClient};
use crate::foundation::{BridgeError, KeyId, ProtocolVersion, Result};
use crate::infrastructure::signer::SignerProtocol;
use std::sync::Arc;

/// Fails with a configuration error when no client variant serves `key_id` at `version`.
pub fn ensure_supported(version: ProtocolVersion, key_id: &KeyId) -> Result<()> {
    if version.is_supported() {
        return Ok(());
    }
    Err(BridgeError::ConfigError(format!("remote signer version {} is not supported for key {}", version, key_id)))
}

/// Client variant for a negotiated version.
pub fn create_signing_client(protocol: Arc<SignerProtocol>, version: ProtocolVersion) -> Result<Arc<dyn SigningClient>> {
    match version.number() {
        1 => Ok(Arc::new(HashSigningClient::new(protocol))),
        2..=5 => Ok(Arc::new(PowSigningClient::new(protocol, version))),
        other => Err(BridgeError::UnsupportedVersion { version: other, key_id: "*".to_string() }),
    }
}
