//! Remote signer transport: pooled connections, retries and status-code classification.

pub mod codes;
pub mod commands;
pub mod connection;
pub mod pool;
pub mod protocol;
pub mod retry;
pub mod simulated;

pub use codes::{classify, Dialect, ResponseCode};
pub use connection::{SignerConnection, TcpJsonConnection};
pub use pool::{lease, ConnectionPool, PooledConnection, TcpConnectionPool};
pub use protocol::{command, validate, SignerProtocol};
pub use retry::retry_transport;
pub use simulated::{SimulatedSigner, SimulatedSignerConfig, SimulatedStats};
