use crate::foundation::Hash32;
use sha2::Sha256;
use sha3::{Digest, Keccak256};

pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    to_hash32(&hasher.finalize())
}

pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    to_hash32(&hasher.finalize())
}

fn to_hash32(digest: &[u8]) -> Hash32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest);
    out
}

/// Double SHA-256 as used by the base chain for txids and sighashes.
pub fn sha256d(data: &[u8]) -> Hash32 {
    sha256(&sha256(data))
}
