//! Scheduled loop that keeps the remote signer's chain pointer advancing.

use crate::application::bookkeeping::client::BookkeepingClient;
use crate::domain::chain::ChainStore;
use crate::domain::confirmation::{select_confirmed_blocks, ConfirmationParams};
use crate::domain::signing::{ListenerSet, SignerListener};
use crate::foundation::{BlockHash, BridgeError, Result};
use crate::infrastructure::config::BookkeepingConfig;
use crate::infrastructure::signer::ResponseCode;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Source name used when broadcasting tick failures to listeners.
pub const BOOKKEEPING_SOURCE: &str = "bookkeeping";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
}

impl ServiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    TickInFlight,
    LocalChainSyncing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// No block on top of the remote best block has enough work yet.
    NothingToReport,
    Advanced { blocks_sent: usize, confirmed: usize, best_block: BlockHash, partial: bool },
}

#[derive(Clone, Copy, Debug)]
pub struct BookkeepingSettings {
    pub difficulty_target: u128,
    pub difficulty_cap: u128,
    pub max_confirmed_blocks: usize,
    pub interval: Duration,
    pub disabled: bool,
    pub stop_on_desync: bool,
}

impl From<&BookkeepingConfig> for BookkeepingSettings {
    fn from(config: &BookkeepingConfig) -> Self {
        Self {
            difficulty_target: config.difficulty_target,
            difficulty_cap: config.difficulty_cap,
            max_confirmed_blocks: config.max_confirmed_blocks,
            interval: config.informer_interval(),
            disabled: config.disabled,
            stop_on_desync: config.stop_on_desync,
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BookkeepingService {
    client: Arc<BookkeepingClient>,
    chain: Arc<dyn ChainStore>,
    settings: BookkeepingSettings,
    state: AtomicU8,
    tick_in_flight: AtomicBool,
    best_block: RwLock<Option<BlockHash>>,
    listeners: ListenerSet,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl BookkeepingService {
    pub fn new(client: Arc<BookkeepingClient>, chain: Arc<dyn ChainStore>, settings: BookkeepingSettings) -> Self {
        Self {
            client,
            chain,
            settings,
            state: AtomicU8::new(ServiceState::Stopped as u8),
            tick_in_flight: AtomicBool::new(false),
            best_block: RwLock::new(None),
            listeners: ListenerSet::new(),
            shutdown: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    pub fn add_listener(&self, listener: Arc<dyn SignerListener>) {
        self.listeners.add(listener);
    }

    /// Best block reported by the remote signer after the last tick. Diagnostic only.
    pub fn current_best_block(&self) -> Option<BlockHash> {
        *self.best_block.read()
    }

    /// Brings the remote pointer to a clean state and schedules periodic ticks.
    ///
    /// Does nothing when bookkeeping is disabled.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.settings.disabled {
            info!("bookkeeping disabled; not starting");
            return Ok(());
        }
        if let Err(current) = self.state.compare_exchange(
            ServiceState::Stopped as u8,
            ServiceState::Starting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(BridgeError::InvalidStateTransition {
                from: ServiceState::from_u8(current).as_str().to_string(),
                to: ServiceState::Running.as_str().to_string(),
            });
        }

        if let Err(err) = self.prepare_remote_pointer().await {
            self.state.store(ServiceState::Stopped as u8, Ordering::Release);
            warn!("bookkeeping failed to start error={}", err);
            self.listeners.notify(BOOKKEEPING_SOURCE, &err);
            return Err(err);
        }

        let (tx, rx) = watch::channel(false);
        {
            // Held across the transition so a stop either cancels the start or finds the sender.
            let mut shutdown = self.shutdown.lock();
            if self
                .state
                .compare_exchange(ServiceState::Starting as u8, ServiceState::Running as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                info!("bookkeeping start cancelled by stop");
                return Ok(());
            }
            *shutdown = Some(tx);
        }
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run(rx).await });
        info!("bookkeeping started interval_ms={}", self.settings.interval.as_millis());
        Ok(())
    }

    /// Cancels future ticks. A tick already executing runs to completion; a start still
    /// preparing the remote pointer is abandoned.
    pub fn stop(&self) {
        let mut shutdown = self.shutdown.lock();
        let previous = self.state.swap(ServiceState::Stopped as u8, Ordering::AcqRel);
        if let Some(tx) = shutdown.take() {
            let _ = tx.send(true);
        }
        drop(shutdown);
        if previous != ServiceState::Stopped as u8 {
            info!("bookkeeping stopped");
        }
    }

    async fn prepare_remote_pointer(&self) -> Result<()> {
        let version = self.client.version().await?;
        let pointer = self.client.get_chain_pointer().await?;
        if pointer.in_progress {
            warn!(
                "remote signer has an unfinished advance; resetting best_block={} next_expected={:?}",
                pointer.best_block_hash, pointer.next_expected_block_hash
            );
            self.client.reset_chain_tracking().await?;
        }
        *self.best_block.write() = Some(pointer.best_block_hash);
        debug!("bookkeeping remote pointer ready version={} best_block={}", version, pointer.best_block_hash);
        Ok(())
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; ticks start one period after start().
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.inform_confirmed_block_headers().await {
                        Ok(outcome) => debug!("bookkeeping tick done outcome={:?}", outcome),
                        Err(err) => debug!("bookkeeping tick failed error={}", err),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("bookkeeping loop exited");
    }

    /// Runs one bookkeeping tick. Failures are logged and broadcast before being returned.
    pub async fn inform_confirmed_block_headers(&self) -> Result<TickOutcome> {
        if self.tick_in_flight.swap(true, Ordering::AcqRel) {
            debug!("bookkeeping tick skipped: previous tick still running");
            return Ok(TickOutcome::Skipped(SkipReason::TickInFlight));
        }
        let _in_flight = InFlight(&self.tick_in_flight);

        if self.chain.is_syncing() {
            debug!("bookkeeping tick skipped: local chain is syncing");
            return Ok(TickOutcome::Skipped(SkipReason::LocalChainSyncing));
        }

        let result = self.tick().await;
        if let Err(err) = &result {
            if err.is_chain_desync() {
                warn!("bookkeeping desynchronized from remote signer error={}", err);
            } else {
                warn!("bookkeeping tick failed error={}", err);
            }
            self.listeners.notify(BOOKKEEPING_SOURCE, err);
            if err.is_chain_desync() && self.settings.stop_on_desync {
                self.stop();
            }
        }
        result
    }

    async fn tick(&self) -> Result<TickOutcome> {
        let version = self.client.version().await?;
        let pointer = self.client.get_chain_pointer().await?;
        let params = ConfirmationParams {
            difficulty_target: self.settings.difficulty_target,
            max_confirmed: self.settings.max_confirmed_blocks,
            difficulty_cap: self.settings.difficulty_cap,
            version,
        };
        let batch = select_confirmed_blocks(self.chain.as_ref(), &pointer.best_block_hash, &params)?;
        if batch.is_empty() {
            *self.best_block.write() = Some(pointer.best_block_hash);
            debug!("no confirmed blocks to report remote_best={}", pointer.best_block_hash);
            return Ok(TickOutcome::NothingToReport);
        }

        let confirmed = batch.confirmed.len();
        let blocks = batch.into_blocks();
        let successor = match blocks.last().and_then(|b| b.number().checked_add(1)) {
            Some(number) => self.chain.chain_block_by_number(number)?,
            None => None,
        };
        let code = self.client.advance_chain(&blocks, successor.as_ref()).await?;

        let refreshed = self.client.get_chain_pointer().await?;
        *self.best_block.write() = Some(refreshed.best_block_hash);
        info!(
            "remote chain advanced blocks_sent={} confirmed={} best_block={} partial={}",
            blocks.len(),
            confirmed,
            refreshed.best_block_hash,
            code == ResponseCode::PartialSuccess
        );
        Ok(TickOutcome::Advanced {
            blocks_sent: blocks.len(),
            confirmed,
            best_block: refreshed.best_block_hash,
            partial: code == ResponseCode::PartialSuccess,
        })
    }
}
