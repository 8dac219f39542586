use crate::foundation::util::decode_hex;
use crate::foundation::{BridgeError, Result};
use secrecy::{ExposeSecret, SecretVec};
use secp256k1::SecretKey;
use zeroize::Zeroize;

/// Key material that never shows up in `Debug` output and is wiped on drop.
pub struct SecretBytes {
    inner: SecretVec<u8>,
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { inner: SecretVec::new(bytes) }
    }

    /// Decodes hex key material, wiping the intermediate text.
    pub fn from_hex(mut text: String) -> Result<Self> {
        let decoded = decode_hex(&text);
        text.zeroize();
        Ok(Self::new(decoded?))
    }

    /// Expose secret bytes for use (explicit, auditable in code review).
    pub fn expose_secret(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_secp256k1(&self) -> Result<SecretKey> {
        SecretKey::from_slice(self.expose_secret()).map_err(|err| BridgeError::crypto("parse_secp256k1_secret", err))
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED {} bytes])", self.len())
    }
}
