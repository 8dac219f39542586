use crate::foundation::BlockHash;
use serde::{Deserialize, Serialize};

/// The remote signer's own validated view of the sidechain.
///
/// Always obtained fresh from the device; never cached beyond the call that read it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChainPointer {
    pub best_block_hash: BlockHash,
    pub ancestor_block_hash: BlockHash,
    /// An advance operation was started and not completed.
    pub in_progress: bool,
    pub next_expected_block_hash: Option<BlockHash>,
    pub newest_valid_block_hash: Option<BlockHash>,
    pub ancestor_receipts_root: Option<BlockHash>,
}

impl RemoteChainPointer {
    pub fn new(best_block_hash: BlockHash, ancestor_block_hash: BlockHash) -> Self {
        Self {
            best_block_hash,
            ancestor_block_hash,
            in_progress: false,
            next_expected_block_hash: None,
            newest_valid_block_hash: None,
            ancestor_receipts_root: None,
        }
    }

    /// The device has not been told about an ancestor yet.
    pub fn ancestor_is_unset(&self) -> bool {
        self.ancestor_block_hash.is_zero()
    }
}

/// Chain parameters the remote signer was provisioned with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
    pub checkpoint: BlockHash,
    pub minimum_difficulty: u128,
    pub network: String,
}
