//! Infrastructure layer: remote signer transport, key backends, config, logging and local stores.

pub mod chain;
pub mod config;
pub mod keys;
pub mod logging;
pub mod signer;
