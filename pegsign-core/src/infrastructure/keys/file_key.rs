//! Signer backend holding a single secp256k1 key in a local file.

use crate::domain::signing::{CheckResult, ListenerSet, SignEnvelope, Signer, SignerListener, SignerSignature};
use crate::foundation::{BridgeError, KeyId, ProtocolVersion, Result};
use crate::infrastructure::keys::secret::SecretBytes;
use async_trait::async_trait;
use log::{debug, warn};
use secp256k1::{Message, PublicKey, Secp256k1};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct KeyFileSigner {
    name: String,
    key_id: KeyId,
    path: PathBuf,
    listeners: ListenerSet,
}

impl KeyFileSigner {
    pub fn new(key_id: KeyId, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self { name: format!("keyfile:{}", key_id), key_id, path, listeners: ListenerSet::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_secret(&self) -> Result<SecretBytes> {
        check_permissions(&self.path)?;
        let text = std::fs::read_to_string(&self.path)
            .map_err(|err| BridgeError::KeyNotFound(format!("{}: {}", self.path.display(), err)))?;
        SecretBytes::from_hex(text)
    }

    fn ensure_key(&self, key_id: &KeyId) -> Result<()> {
        if *key_id != self.key_id {
            return Err(BridgeError::NoSuitableSigner(key_id.to_string()));
        }
        Ok(())
    }

    fn report(&self, err: BridgeError) -> BridgeError {
        if matches!(err, BridgeError::KeyNotFound(_) | BridgeError::InsecureFilePermissions { .. } | BridgeError::CryptoError { .. }) {
            warn!("key file signer failure signer={} error={}", self.name, err);
            self.listeners.notify(&self.name, &err);
        }
        err
    }
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path).map_err(|err| BridgeError::KeyNotFound(format!("{}: {}", path.display(), err)))?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(BridgeError::InsecureFilePermissions { path: path.display().to_string(), mode });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(path: &Path) -> Result<()> {
    std::fs::metadata(path).map_err(|err| BridgeError::KeyNotFound(format!("{}: {}", path.display(), err)))?;
    Ok(())
}

#[async_trait]
impl Signer for KeyFileSigner {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_sign_with(&self, key_id: &KeyId) -> bool {
        *key_id == self.key_id
    }

    async fn check(&self) -> CheckResult {
        if !self.path.exists() {
            return CheckResult::failed(format!("{}: key file {} does not exist", self.name, self.path.display()));
        }
        match self.load_secret().and_then(|secret| secret.to_secp256k1()) {
            Ok(_) => CheckResult::ok(),
            Err(err) => CheckResult::failed(format!("{}: {}", self.name, err)),
        }
    }

    async fn version_for_key_id(&self, key_id: &KeyId) -> Result<ProtocolVersion> {
        self.ensure_key(key_id)?;
        Ok(ProtocolVersion::V1)
    }

    async fn public_key(&self, key_id: &KeyId) -> Result<Vec<u8>> {
        self.ensure_key(key_id)?;
        let secret = self.load_secret().and_then(|s| s.to_secp256k1()).map_err(|err| self.report(err))?;
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        Ok(public.serialize_uncompressed().to_vec())
    }

    async fn sign(&self, key_id: &KeyId, envelope: &SignEnvelope) -> Result<SignerSignature> {
        self.ensure_key(key_id)?;
        let signed_hash = envelope.signed_hash()?;
        let secret = self.load_secret().and_then(|s| s.to_secp256k1()).map_err(|err| self.report(err))?;

        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(&signed_hash)?;
        let (rec_id, compact) = secp.sign_ecdsa_recoverable(&message, &secret).serialize_compact();
        let public = PublicKey::from_secret_key(&secp, &secret);
        debug!("key file signer produced signature signer={} key_id={}", self.name, key_id);

        Ok(SignerSignature {
            r: compact[..32].to_vec(),
            s: compact[32..].to_vec(),
            recovery_id: u8::try_from(rec_id.to_i32()).ok(),
            signed_hash,
            public_key: public.serialize_uncompressed().to_vec(),
        })
    }

    fn add_listener(&self, listener: Arc<dyn SignerListener>) {
        self.listeners.add(listener);
    }
}
