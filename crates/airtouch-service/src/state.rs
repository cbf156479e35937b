//! Shared controller state.
//!
//! # Cycle Record Channel
//!
//! Every tick publishes one [`CycleRecord`] per zone on `records_tx`. The
//! channel is a `tokio::sync::broadcast`, so:
//!
//! - **No blocking**: the control loop never waits on subscribers
//! - **Message loss**: a subscriber that falls more than
//!   [`RECORD_BUFFER`] records behind loses the oldest ones
//! - **No subscribers**: records are dropped, and that is fine

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast, watch};

use airtouch_core::ReactiveConfig;
use airtouch_store::{DeviceCache, SampleStore, StoreConfig};
use airtouch_types::{Clock, Command, ZoneId};

use crate::config::{Config, ConfigError};
use crate::machine::FaultReason;
use crate::schedule::SleepSchedule;

/// Capacity of the cycle record broadcast channel.
pub const RECORD_BUFFER: usize = 256;

/// Shared controller state.
pub struct AppState {
    /// Validated configuration, fixed for the life of the process.
    pub config: Arc<Config>,
    /// Controller tuning derived from `config`.
    pub reactive: ReactiveConfig,
    /// Sleep window derived from `config`.
    pub schedule: SleepSchedule,
    /// Time source for samples, cache freshness and records.
    pub clock: Arc<dyn Clock>,
    /// Per-zone sample history.
    pub samples: SampleStore,
    /// Last-known device state per zone.
    pub cache: DeviceCache,
    /// Broadcast channel for cycle records.
    pub records_tx: broadcast::Sender<CycleRecord>,
    /// Control loop state.
    pub control: LoopState,
}

impl AppState {
    /// Validate `config` and build the shared state around it.
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let schedule = config.sleep_schedule()?;
        let reactive = config.reactive();

        let samples = SampleStore::new(
            StoreConfig::default().history(config.timing.history()),
            Arc::clone(&clock),
        );
        let cache = DeviceCache::new(config.timing.cache_ttl(), Arc::clone(&clock));
        let (records_tx, _) = broadcast::channel(RECORD_BUFFER);

        Ok(Arc::new(Self {
            config: Arc::new(config),
            reactive,
            schedule,
            clock,
            samples,
            cache,
            records_tx,
            control: LoopState::new(),
        }))
    }
}

/// State for tracking and controlling the control loop.
pub struct LoopState {
    /// Whether the loop is currently running.
    running: AtomicBool,
    /// When the loop was started (Unix timestamp, `i64::MIN` if never).
    started_at: AtomicI64,
    /// Completed cycles.
    cycles: AtomicU64,
    /// Channel to signal the loop to stop.
    stop_tx: watch::Sender<bool>,
    /// Receiver for the stop signal.
    stop_rx: watch::Receiver<bool>,
    /// Per-zone statistics.
    pub zone_stats: RwLock<HashMap<ZoneId, ZoneStats>>,
}

impl LoopState {
    /// Create a new loop state.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicI64::new(i64::MIN),
            cycles: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            zone_stats: RwLock::new(HashMap::new()),
        }
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the loop as started at `at`.
    pub fn mark_started(&self, at: OffsetDateTime) {
        self.started_at.store(at.unix_timestamp(), Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Mark the loop as stopped. The start time is kept.
    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the loop start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        match self.started_at.load(Ordering::SeqCst) {
            i64::MIN => None,
            ts => OffsetDateTime::from_unix_timestamp(ts).ok(),
        }
    }

    /// Count a completed cycle, returning the new total.
    pub fn cycle_completed(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Completed cycles so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the loop to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Snapshot of every zone's statistics, sorted by zone.
    pub async fn stats(&self) -> Vec<ZoneStats> {
        let mut stats: Vec<_> = self.zone_stats.read().await.values().cloned().collect();
        stats.sort_by(|a, b| a.zone.cmp(&b.zone));
        stats
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

/// Control statistics for a single zone.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneStats {
    /// Zone identifier.
    pub zone: ZoneId,
    /// Zone alias.
    pub alias: Option<String>,
    /// Time of the last accepted command.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_command_at: Option<OffsetDateTime>,
    /// The last accepted command.
    pub last_command: Option<Command>,
    /// Time of the last fault.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_fault_at: Option<OffsetDateTime>,
    /// The last fault.
    pub last_fault: Option<FaultReason>,
    /// Cycles ending in a command.
    pub commanded_count: u64,
    /// Cycles ending in a fault.
    pub fault_count: u64,
    /// Ticks skipped because the zone was still busy.
    pub skipped_count: u64,
    /// Faults since the last command.
    pub consecutive_failures: u32,
}

impl ZoneStats {
    /// Empty statistics for `zone`.
    pub fn new(zone: ZoneId, alias: Option<String>) -> Self {
        Self {
            zone,
            alias,
            last_command_at: None,
            last_command: None,
            last_fault_at: None,
            last_fault: None,
            commanded_count: 0,
            fault_count: 0,
            skipped_count: 0,
            consecutive_failures: 0,
        }
    }

    /// Fold one cycle's record into the statistics.
    pub fn apply(&mut self, record: &CycleRecord) {
        match &record.outcome {
            CycleOutcome::Commanded { command } => {
                self.commanded_count += 1;
                self.consecutive_failures = 0;
                self.last_command_at = Some(record.at);
                self.last_command = Some(command.clone());
            }
            CycleOutcome::Faulted { reason } => {
                self.fault_count += 1;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_fault_at = Some(record.at);
                self.last_fault = Some(reason.clone());
            }
            CycleOutcome::Skipped => self.skipped_count += 1,
        }
    }

    /// Whether the zone's most recent completed cycle faulted.
    pub fn is_faulted(&self) -> bool {
        self.consecutive_failures > 0
    }
}

/// How one zone's tick ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A command was written and accepted.
    Commanded { command: Command },
    /// The cycle faulted; nothing was written or recorded.
    Faulted { reason: FaultReason },
    /// The zone was still busy with a previous tick.
    Skipped,
}

/// Telemetry record for one zone and one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    /// Zone the record is for.
    pub zone: ZoneId,
    /// How the tick ended.
    #[serde(flatten)]
    pub outcome: CycleOutcome,
    /// Whether the zone is faulted after this tick.
    pub faulted: bool,
    /// When the tick started.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl CycleRecord {
    /// Build a record, deriving `faulted` from the outcome.
    ///
    /// A skipped tick inherits the zone's previous fault flag.
    pub fn new(zone: ZoneId, outcome: CycleOutcome, previously_faulted: bool, at: OffsetDateTime) -> Self {
        let faulted = match outcome {
            CycleOutcome::Commanded { .. } => false,
            CycleOutcome::Faulted { .. } => true,
            CycleOutcome::Skipped => previously_faulted,
        };
        Self {
            zone,
            outcome,
            faulted,
            at,
        }
    }

    /// The command, if one was issued.
    pub fn command(&self) -> Option<&Command> {
        match &self.outcome {
            CycleOutcome::Commanded { command } => Some(command),
            _ => None,
        }
    }

    /// The fault, if the cycle faulted.
    pub fn fault(&self) -> Option<&FaultReason> {
        match &self.outcome {
            CycleOutcome::Faulted { reason } => Some(reason),
            _ => None,
        }
    }
}
