use crate::domain::chain::{Block, ChainStore, ReceiptProof, ReceiptProofStore};
use crate::foundation::{BlockHash, BridgeError, Result, TxHash};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct ChainInner {
    blocks: HashMap<BlockHash, Block>,
    canonical: Vec<BlockHash>,
}

/// In-memory canonical chain, used by devnets and tests.
///
/// Height `n` of the canonical chain is `canonical[n]`; the first block pushed is genesis.
pub struct MemoryChainStore {
    inner: Arc<Mutex<ChainInner>>,
    syncing: AtomicBool,
}

impl MemoryChainStore {
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        Self { inner: Arc::new(Mutex::new(ChainInner { blocks, canonical: vec![hash] })), syncing: AtomicBool::new(false) }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, ChainInner>> {
        self.inner.lock().map_err(|_| BridgeError::StorageError {
            operation: "memory chain store lock".to_string(),
            details: "poisoned".to_string(),
        })
    }

    /// Appends `block` to the canonical chain. Its parent must be the current tip.
    pub fn push(&self, block: Block) -> Result<()> {
        let mut inner = self.lock_inner()?;
        let tip = inner.canonical.last().copied().unwrap_or_default();
        if block.parent_hash() != tip || block.number() != inner.canonical.len() as u64 {
            return Err(BridgeError::StorageError {
                operation: "push block".to_string(),
                details: format!("block {} number={} does not extend tip {}", block.hash(), block.number(), tip),
            });
        }
        let hash = block.hash();
        inner.blocks.insert(hash, block);
        inner.canonical.push(hash);
        Ok(())
    }

    /// Stores a block off the canonical chain (an uncle or a fork).
    pub fn insert_side_block(&self, block: Block) -> Result<()> {
        self.lock_inner()?.blocks.insert(block.hash(), block);
        Ok(())
    }

    /// Replaces the canonical chain above `fork_height` with `blocks`, keeping the old blocks addressable by hash.
    pub fn reorg(&self, fork_height: u64, blocks: Vec<Block>) -> Result<()> {
        let mut inner = self.lock_inner()?;
        inner.canonical.truncate(fork_height as usize + 1);
        drop(inner);
        for block in blocks {
            self.push(block)?;
        }
        Ok(())
    }

    pub fn height(&self) -> Result<u64> {
        Ok(self.lock_inner()?.canonical.len().saturating_sub(1) as u64)
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::SeqCst);
    }
}

impl ChainStore for MemoryChainStore {
    fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>> {
        Ok(self.lock_inner()?.blocks.get(hash).cloned())
    }

    fn chain_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        let inner = self.lock_inner()?;
        Ok(inner.canonical.get(number as usize).and_then(|hash| inner.blocks.get(hash)).cloned())
    }

    fn best_block(&self) -> Result<Block> {
        let inner = self.lock_inner()?;
        inner
            .canonical
            .last()
            .and_then(|hash| inner.blocks.get(hash))
            .cloned()
            .ok_or_else(|| BridgeError::BlockNotFound("canonical tip".to_string()))
    }

    fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MemoryReceiptProofStore {
    proofs: Mutex<HashMap<(TxHash, BlockHash), ReceiptProof>>,
}

impl MemoryReceiptProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx_hash: TxHash, block_hash: BlockHash, proof: ReceiptProof) -> Result<()> {
        self.proofs
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "receipt store lock".to_string(), details: "poisoned".to_string() })?
            .insert((tx_hash, block_hash), proof);
        Ok(())
    }
}

impl ReceiptProofStore for MemoryReceiptProofStore {
    fn receipt_proof(&self, tx_hash: &TxHash, block_hash: &BlockHash) -> Result<Option<ReceiptProof>> {
        let proofs = self
            .proofs
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "receipt store lock".to_string(), details: "poisoned".to_string() })?;
        Ok(proofs.get(&(*tx_hash, *block_hash)).cloned())
    }
}
