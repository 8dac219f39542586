//! Application layer: orchestration across domain logic and infrastructure I/O.

pub mod ancestor;
pub mod bookkeeping;
pub mod context;
pub mod lifecycle;
pub mod pegout;
pub mod signing;
pub mod startup;

pub use ancestor::{AncestorReconciler, AncestorUpdate};
pub use bookkeeping::{BookkeepingClient, BookkeepingService, BookkeepingSettings, TickOutcome};
pub use context::BridgeContext;
pub use lifecycle::BookkeepingLifecycle;
pub use pegout::{PegoutInput, PegoutSigner, PegoutSigningRequest};
pub use signing::{CompositeSigner, RemoteSigner, SigningClient};
pub use startup::{KeyReport, SignerStartupCheck, StartupReport};
