//! Confirmed block selection.
//!
//! Walks the local canonical chain forward from the block the remote signer already trusts,
//! accumulating difficulty in a FIFO of "potential" blocks. Whenever the accumulated work
//! reaches the target, the oldest potential block is confirmed and its contribution removed.
//! The blocks still pending at the end are returned as proof: the remote signer needs them to
//! verify the work that confirms the rest.

use crate::domain::chain::{Block, ChainStore};
use crate::foundation::{BlockHash, BridgeError, ProtocolVersion, Result, DIFFICULTY_CAP_MIN_VERSION};
use log::{debug, trace};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationParams {
    /// Accumulated difficulty needed above a block before it counts as confirmed.
    pub difficulty_target: u128,
    pub max_confirmed: usize,
    /// Ceiling applied to a single block's contribution once the cap is active.
    pub difficulty_cap: u128,
    pub version: ProtocolVersion,
}

impl ConfirmationParams {
    pub fn cap_active(&self) -> bool {
        self.version.number() >= DIFFICULTY_CAP_MIN_VERSION
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfirmedBatch {
    pub confirmed: Vec<Block>,
    /// Trailing unconfirmed blocks whose work backs the confirmations.
    pub proof: Vec<Block>,
}

impl ConfirmedBatch {
    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.proof.len()
    }

    /// Newest confirmed block, the one the remote signer will treat as its best block.
    pub fn last_confirmed(&self) -> Option<&Block> {
        self.confirmed.last()
    }

    /// Confirmed blocks followed by the proof blocks, oldest first.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.confirmed.iter().chain(self.proof.iter())
    }

    pub fn into_blocks(self) -> Vec<Block> {
        let mut out = self.confirmed;
        out.extend(self.proof);
        out
    }
}

/// Work a single block adds to the accumulator.
pub fn block_contribution(block: &Block, params: &ConfirmationParams) -> u128 {
    if !params.cap_active() {
        return block.difficulty();
    }
    block.difficulty().saturating_add(block.uncles_difficulty()).min(params.difficulty_cap)
}

/// Selects the blocks that are confirmed on top of `start`.
///
/// Fails with a desync error when `start` is unknown locally: the remote signer is tracking a
/// block this node never saw (or has pruned), and bookkeeping cannot continue from it.
pub fn select_confirmed_blocks(chain: &dyn ChainStore, start: &BlockHash, params: &ConfirmationParams) -> Result<ConfirmedBatch> {
    let start_block = chain
        .block_by_hash(start)?
        .ok_or_else(|| BridgeError::desync(format!("starting block {} not found in local chain store", start)))?;

    let mut confirmed: Vec<Block> = Vec::new();
    let mut potential: VecDeque<Block> = VecDeque::new();
    let mut accumulated: u128 = 0;
    let mut height = start_block.number();

    while confirmed.len() < params.max_confirmed {
        height = match height.checked_add(1) {
            Some(next) => next,
            None => break,
        };
        let Some(block) = chain.chain_block_by_number(height)? else {
            break;
        };

        let contribution = block_contribution(&block, params);
        trace!("confirmation walk block_number={} contribution={} accumulated={}", height, contribution, accumulated);
        accumulated = accumulated.saturating_add(contribution);
        potential.push_back(block);

        while accumulated >= params.difficulty_target && confirmed.len() < params.max_confirmed {
            let Some(oldest) = potential.pop_front() else {
                break;
            };
            accumulated = accumulated.saturating_sub(block_contribution(&oldest, params));
            confirmed.push(oldest);
        }
    }

    debug!(
        "confirmed block selection start={} confirmed={} proof={} accumulated={}",
        start,
        confirmed.len(),
        potential.len(),
        accumulated
    );

    if confirmed.is_empty() {
        return Ok(ConfirmedBatch::default());
    }
    Ok(ConfirmedBatch { confirmed, proof: potential.into_iter().collect() })
}
