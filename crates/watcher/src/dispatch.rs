//! Event dispatcher
//!
//! Sits between the source of watch events and the consumer. Incoming events
//! are registered with a [`Contractor`] as they arrive; accepted events wait
//! in a FIFO until the next flush, which packs each one and fires its
//! release hook. Anything that arrives for a path while its event waits is
//! folded into it by the contractor.

use crate::config::DispatchConfig;
use crate::pack::{pack, PackedEvent};
use anyhow::{Context, Result};
use contractor_core::{Contractor, PackHook, Registration, WatchEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Dispatcher shared between several producers
///
/// The mutex gives every `submit` and `flush` a single total order, which is
/// all the contractor needs.
pub type SharedDispatcher = Arc<Mutex<Dispatcher>>;

/// Counters kept by a dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to `submit`
    pub submitted: u64,
    /// Events that became pending
    pub accepted: u64,
    /// Events folded into a pending event
    pub morphed: u64,
    /// Events packed and released
    pub packed: u64,
}

/// Drives a contractor: register on arrival, pack and release on flush
pub struct Dispatcher {
    contractor: Contractor,
    /// Hooks of accepted events, in arrival order
    queue: VecDeque<PackHook>,
    config: DispatchConfig,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Create a dispatcher, rejecting out-of-range configuration
    pub fn new(config: DispatchConfig) -> Result<Self> {
        config.validate().context("Invalid dispatcher config")?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: DispatchConfig) -> Self {
        Self {
            contractor: Contractor::new(),
            queue: VecDeque::new(),
            config,
            stats: DispatchStats::default(),
        }
    }

    pub fn shared(self) -> SharedDispatcher {
        Arc::new(Mutex::new(self))
    }

    /// Register an event
    ///
    /// Returns true if the event was queued, false if it was folded into an
    /// event that is already queued.
    pub fn submit(&mut self, evt: WatchEvent) -> Result<bool> {
        self.stats.submitted += 1;

        match self.contractor.register(evt)? {
            Registration::Accepted(hook) => {
                self.stats.accepted += 1;
                self.queue.push_back(hook);
                Ok(true)
            }
            Registration::Morphed(id) => {
                debug!("Event folded into pending event {}", id);
                self.stats.morphed += 1;
                Ok(false)
            }
        }
    }

    /// Pack and release up to `max_batch` queued events
    ///
    /// Events that were superseded while queued are still delivered; their
    /// release just leaves the newer event in place.
    pub fn flush(&mut self) -> Result<Vec<PackedEvent>> {
        let count = self.queue.len().min(self.config.max_batch);
        let mut packed = Vec::with_capacity(count);

        for hook in self.queue.drain(..count) {
            let Some(evt) = self.contractor.event(&hook) else {
                warn!(
                    "Queued event {} for {} was already released",
                    hook.id(),
                    hook.path().display()
                );
                continue;
            };
            packed.push(pack(evt));
            self.contractor
                .release(hook)
                .context("Failed to release packed event")?;
        }

        self.stats.packed += packed.len() as u64;
        Ok(packed)
    }

    /// Number of accepted events waiting for a flush
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn contractor(&self) -> &Contractor {
        &self.contractor
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Run the dispatch loop
    ///
    /// Registers events from `events` as they arrive and flushes a batch on
    /// every tick of the configured interval. When `events` closes, the
    /// remaining queue is flushed and the final counters returned.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<WatchEvent>,
        packed_tx: mpsc::Sender<Vec<PackedEvent>>,
    ) -> Result<DispatchStats> {
        let mut timer = interval(self.config.flush_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        timer.tick().await;

        info!("Starting dispatcher (flush interval: {:?})", self.config.flush_interval());

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Some(evt) => {
                        self.submit(evt)?;
                    }
                    None => break,
                },
                _ = timer.tick() => {
                    self.send_batch(&packed_tx).await?;
                }
            }
        }

        while !self.queue.is_empty() {
            self.send_batch(&packed_tx).await?;
        }

        info!(
            "Dispatcher stopped: {} submitted, {} morphed, {} packed",
            self.stats.submitted, self.stats.morphed, self.stats.packed
        );
        Ok(self.stats)
    }

    async fn send_batch(&mut self, packed_tx: &mpsc::Sender<Vec<PackedEvent>>) -> Result<()> {
        let batch = self.flush()?;
        if batch.is_empty() {
            return Ok(());
        }

        debug!("Sending {} packed events", batch.len());
        packed_tx
            .send(batch)
            .await
            .context("Packed event receiver closed")?;
        Ok(())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_config(DispatchConfig::default())
    }
}
