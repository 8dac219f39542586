pub mod client;
pub mod service;

pub use client::{parse_chain_parameters, parse_chain_pointer, sibling_headers, BookkeepingClient};
pub use service::{BookkeepingService, BookkeepingSettings, ServiceState, SkipReason, TickOutcome, BOOKKEEPING_SOURCE};
