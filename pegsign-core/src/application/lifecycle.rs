//! Starts and stops bookkeeping as the node joins or leaves the federation.

use crate::application::bookkeeping::{BookkeepingService, ServiceState};
use crate::foundation::{BridgeError, Result};
use log::info;
use std::sync::Arc;

pub struct BookkeepingLifecycle {
    service: Arc<BookkeepingService>,
}

impl BookkeepingLifecycle {
    pub fn new(service: Arc<BookkeepingService>) -> Self {
        Self { service }
    }

    /// Idempotent: repeated notifications with the same membership do nothing. A service that is
    /// still starting counts as started.
    pub async fn on_membership_changed(&self, is_member: bool) -> Result<()> {
        let started = self.service.state() != ServiceState::Stopped;
        match (is_member, started) {
            (true, false) => {
                info!("joined federation; starting bookkeeping");
                match self.service.start().await {
                    // A concurrent join got there first.
                    Err(BridgeError::InvalidStateTransition { .. }) => Ok(()),
                    other => other,
                }
            }
            (false, true) => {
                info!("left federation; stopping bookkeeping");
                self.service.stop();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
