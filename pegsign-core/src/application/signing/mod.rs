pub mod client;
pub mod composite;
pub mod factory;
pub mod remote_signer;

pub use client::{HashSigningClient, PowSigningClient, SigningClient};
pub use composite::CompositeSigner;
pub use factory::{create_signing_client, ensure_supported};
pub use remote_signer::RemoteSigner;
