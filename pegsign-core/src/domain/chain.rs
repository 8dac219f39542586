//! Sidechain block model and the local chain-store ports.

use crate::foundation::util::keccak256;
use crate::foundation::{BlockHash, BridgeError, Result, TxHash};
use serde::{Deserialize, Serialize};

/// Sidechain block header as tracked by the local node.
///
/// `encoded` is the header's consensus serialization, which is what the remote signer receives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub number: u64,
    pub difficulty: u128,
    #[serde(with = "hex_bytes")]
    pub encoded: Vec<u8>,
}

impl BlockHeader {
    /// Builds a header whose encoding is the flat concatenation of its fields plus `extra`,
    /// hashed with Keccak-256. Used by devnets and the simulated signer.
    pub fn from_fields(parent_hash: BlockHash, number: u64, difficulty: u128, extra: &[u8]) -> Self {
        let mut encoded = Vec::with_capacity(32 + 8 + 16 + extra.len());
        encoded.extend_from_slice(parent_hash.as_ref());
        encoded.extend_from_slice(&number.to_be_bytes());
        encoded.extend_from_slice(&difficulty.to_be_bytes());
        encoded.extend_from_slice(extra);
        let hash = BlockHash::new(keccak256(&encoded));
        Self { hash, parent_hash, number, difficulty, encoded }
    }

    /// Inverse of [`BlockHeader::from_fields`].
    pub fn decode(encoded: &[u8]) -> Result<Self> {
        const FIXED: usize = 32 + 8 + 16;
        if encoded.len() < FIXED {
            return Err(BridgeError::EncodingError(format!("header too short: {} bytes", encoded.len())));
        }
        let mut parent = [0u8; 32];
        parent.copy_from_slice(&encoded[..32]);
        let mut number = [0u8; 8];
        number.copy_from_slice(&encoded[32..40]);
        let mut difficulty = [0u8; 16];
        difficulty.copy_from_slice(&encoded[40..FIXED]);
        Ok(Self {
            hash: BlockHash::new(keccak256(encoded)),
            parent_hash: BlockHash::new(parent),
            number: u64::from_be_bytes(number),
            difficulty: u128::from_be_bytes(difficulty),
            encoded: encoded.to_vec(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Uncle headers referenced by this block.
    #[serde(default)]
    pub uncles: Vec<BlockHeader>,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Self { header, uncles: Vec::new() }
    }

    pub fn with_uncles(header: BlockHeader, uncles: Vec<BlockHeader>) -> Self {
        Self { header, uncles }
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash
    }

    pub fn parent_hash(&self) -> BlockHash {
        self.header.parent_hash
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn difficulty(&self) -> u128 {
        self.header.difficulty
    }

    pub fn uncles_difficulty(&self) -> u128 {
        self.uncles.iter().fold(0u128, |acc, uncle| acc.saturating_add(uncle.difficulty))
    }
}

/// Transaction receipt plus the Merkle path proving it under a block's receipts root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptProof {
    #[serde(with = "hex_bytes")]
    pub receipt: Vec<u8>,
    #[serde(default)]
    pub merkle_proof: Vec<Vec<u8>>,
}

/// Local canonical chain as seen by the node.
pub trait ChainStore: Send + Sync {
    fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>>;

    /// Canonical-chain block at `number`, if the chain reaches that height.
    fn chain_block_by_number(&self, number: u64) -> Result<Option<Block>>;

    fn best_block(&self) -> Result<Block>;

    /// True while the node is itself catching up with the network.
    fn is_syncing(&self) -> bool;
}

pub trait ReceiptProofStore: Send + Sync {
    fn receipt_proof(&self, tx_hash: &TxHash, block_hash: &BlockHash) -> Result<Option<ReceiptProof>>;
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
