pub mod check;
pub mod envelope;
pub mod signature;
pub mod signer;

pub use check::CheckResult;
pub use envelope::{PegoutInputEnvelope, SighashSpec, SignEnvelope, SignRequest};
pub use signature::{CanonicalSignature, SignerSignature};
pub use signer::{ListenerSet, NoopSignerListener, Signer, SignerListener};
