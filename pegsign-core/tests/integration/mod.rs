mod pegout_flow;
mod signer_routing;
mod startup_check;
mod transport_retry;
