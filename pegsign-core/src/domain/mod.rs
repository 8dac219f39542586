//! Domain layer: chain model, confirmation logic and signing types. No I/O.

pub mod btc;
pub mod chain;
pub mod confirmation;
pub mod pointer;
pub mod signing;

pub use chain::{Block, BlockHeader, ChainStore, ReceiptProof, ReceiptProofStore};
pub use confirmation::{block_contribution, select_confirmed_blocks, ConfirmationParams, ConfirmedBatch};
pub use pointer::{ChainParameters, RemoteChainPointer};
