use crate::foundation::util::left_pad_32;
use crate::foundation::{BridgeError, Hash32, Result, RECOVERY_BYTE_OFFSET, SIGNATURE_COMPONENT_SIZE};
use log::trace;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, PublicKey, Secp256k1};

/// Signature as returned by a signer backend, before canonicalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerSignature {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
    /// Recovery id as reported by the backend, either raw (0..=3) or offset by 27.
    pub recovery_id: Option<u8>,
    pub signed_hash: Hash32,
    /// Public key the backend reports for the signing key id.
    pub public_key: Vec<u8>,
}

/// Low-S ECDSA signature verified against the signer's public key, with a known recovery id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanonicalSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl CanonicalSignature {
    pub fn to_compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..SIGNATURE_COMPONENT_SIZE].copy_from_slice(&self.r);
        out[SIGNATURE_COMPONENT_SIZE..].copy_from_slice(&self.s);
        out
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(Signature::from_compact(&self.to_compact())?.serialize_der().to_vec())
    }

    /// Recovery id in the 27/28 "v" form.
    pub fn v(&self) -> u8 {
        self.recovery_id + RECOVERY_BYTE_OFFSET
    }
}

impl SignerSignature {
    /// Normalizes to low-S, verifies against `public_key` and resolves the recovery id.
    ///
    /// A missing recovery id is found by trial recovery against the known public key.
    pub fn to_canonical(&self) -> Result<CanonicalSignature> {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_slice(&self.public_key)
            .map_err(|err| BridgeError::InvalidSignature(format!("invalid signer public key: {}", err)))?;
        let message = Message::from_digest_slice(&self.signed_hash)?;

        let mut compact = [0u8; 64];
        compact[..SIGNATURE_COMPONENT_SIZE].copy_from_slice(&left_pad_32(&self.r)?);
        compact[SIGNATURE_COMPONENT_SIZE..].copy_from_slice(&left_pad_32(&self.s)?);
        let mut signature =
            Signature::from_compact(&compact).map_err(|err| BridgeError::InvalidSignature(format!("malformed r/s: {}", err)))?;
        signature.normalize_s();

        secp.verify_ecdsa(&message, &signature, &public_key)
            .map_err(|_| BridgeError::InvalidSignature("signature does not verify against signer public key".to_string()))?;

        let normalized = signature.serialize_compact();
        let recovery_id = match self.recovery_id {
            Some(raw) => {
                let id = if raw >= RECOVERY_BYTE_OFFSET { raw - RECOVERY_BYTE_OFFSET } else { raw };
                if recovers_to(&secp, &message, &normalized, id, &public_key) {
                    id
                } else {
                    trace!("reported recovery id does not match normalized signature reported={} searching", raw);
                    find_recovery_id(&secp, &message, &normalized, &public_key)?
                }
            }
            None => find_recovery_id(&secp, &message, &normalized, &public_key)?,
        };

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&normalized[..SIGNATURE_COMPONENT_SIZE]);
        s.copy_from_slice(&normalized[SIGNATURE_COMPONENT_SIZE..]);
        Ok(CanonicalSignature { r, s, recovery_id })
    }
}

fn recovers_to(secp: &Secp256k1<secp256k1::All>, message: &Message, compact: &[u8; 64], id: u8, expected: &PublicKey) -> bool {
    let Ok(rec_id) = RecoveryId::from_i32(i32::from(id)) else {
        return false;
    };
    let Ok(recoverable) = RecoverableSignature::from_compact(compact, rec_id) else {
        return false;
    };
    matches!(secp.recover_ecdsa(message, &recoverable), Ok(recovered) if recovered == *expected)
}

fn find_recovery_id(secp: &Secp256k1<secp256k1::All>, message: &Message, compact: &[u8; 64], expected: &PublicKey) -> Result<u8> {
    (0u8..4)
        .find(|id| recovers_to(secp, message, compact, *id, expected))
        .ok_or_else(|| BridgeError::InvalidSignature("no recovery id reproduces the signer public key".to_string()))
}
