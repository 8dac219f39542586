//! Base-chain transaction model used to build pegout signing envelopes.

pub mod sighash;
pub mod tx;

pub use sighash::{legacy_sighash, segwit_sighash, SighashMode};
pub use tx::{BtcTransaction, TxIn, TxOut};
