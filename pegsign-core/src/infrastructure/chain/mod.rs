pub mod memory;

pub use memory::{MemoryChainStore, MemoryReceiptProofStore};
