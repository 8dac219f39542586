//! Aligns the remote signer's ancestor pointer with a block a signature depends on.

use crate::application::bookkeeping::BookkeepingClient;
use crate::domain::chain::{Block, BlockHeader, ChainStore};
use crate::foundation::{BlockHash, BridgeError, Result};
use log::{debug, info};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AncestorUpdate {
    AlreadyInPosition,
    Updated { headers_sent: usize },
}

pub struct AncestorReconciler {
    client: Arc<BookkeepingClient>,
    chain: Arc<dyn ChainStore>,
}

impl AncestorReconciler {
    pub fn new(client: Arc<BookkeepingClient>, chain: Arc<dyn ChainStore>) -> Self {
        Self { client, chain }
    }

    /// Moves the remote ancestor pointer to `target`.
    ///
    /// Walks back from the current remote ancestor when the target is older than it, otherwise
    /// from the remote best block. An unset or locally unknown remote ancestor also starts from
    /// the best block.
    pub async fn ensure_ancestor(&self, target: &BlockHash) -> Result<AncestorUpdate> {
        let pointer = self.client.get_chain_pointer().await?;
        if pointer.ancestor_block_hash == *target {
            debug!("remote ancestor already in position target={}", target);
            return Ok(AncestorUpdate::AlreadyInPosition);
        }

        let target_block = self.chain.block_by_hash(target)?.ok_or_else(|| BridgeError::BlockNotFound(target.to_string()))?;
        let remote_ancestor =
            if pointer.ancestor_is_unset() { None } else { self.chain.block_by_hash(&pointer.ancestor_block_hash)? };

        let start = match remote_ancestor {
            Some(ancestor) if target_block.number() < ancestor.number() => ancestor,
            _ => {
                let best = self.chain.block_by_hash(&pointer.best_block_hash)?.ok_or_else(|| {
                    BridgeError::desync(format!("remote best block {} not found in local chain store", pointer.best_block_hash))
                })?;
                if target_block.number() > best.number() {
                    return Err(BridgeError::TargetAheadOfBestBlock { target_height: target_block.number(), best_height: best.number() });
                }
                best
            }
        };

        let path = self.header_path(start, &target_block)?;
        info!(
            "updating remote ancestor target={} target_height={} start_height={} headers={}",
            target,
            target_block.number(),
            path.first().map(|h| h.number).unwrap_or_default(),
            path.len()
        );
        self.client.update_ancestor(&path).await?;

        let after = self.client.get_chain_pointer().await?;
        if after.ancestor_block_hash != *target {
            return Err(BridgeError::AncestorNotUpdated {
                expected: target.to_string(),
                actual: after.ancestor_block_hash.to_string(),
            });
        }
        Ok(AncestorUpdate::Updated { headers_sent: path.len() })
    }

    /// Headers from `start` back to `target` inclusive, newest first.
    fn header_path(&self, start: Block, target: &Block) -> Result<Vec<BlockHeader>> {
        let mut path = Vec::new();
        let mut current = start;
        while current.number() > target.number() {
            let parent_hash = current.parent_hash();
            path.push(current.header);
            current = self
                .chain
                .block_by_hash(&parent_hash)?
                .ok_or_else(|| BridgeError::desync(format!("ancestor path broken: block {} not found", parent_hash)))?;
        }
        if current.hash() != target.hash() {
            return Err(BridgeError::desync(format!(
                "block {} is not an ancestor of the remote pointer (reached {} at height {})",
                target.hash(),
                current.hash(),
                current.number()
            )));
        }
        path.push(current.header);
        Ok(path)
    }
}
