//! Periodic control loop.
//!
//! Every tick fans out one task per configured zone. Each zone runs its own
//! [`ZoneMachine`] through sense, refresh, decide and command; a zone whose
//! previous tick is still running is skipped rather than queued. Failures
//! stay inside the zone that hit them.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, trace, warn};

use airtouch_core::{AcDriver, TelemetryValidator, decide};
use airtouch_store::{Lookup, Resample};
use airtouch_types::{Command, ControlTarget, Sample, TargetMode, ZoneId};

use crate::config::ConfigError;
use crate::machine::{FaultReason, ZoneMachine, ZonePhase};
use crate::schedule::until_next_boundary;
use crate::state::{AppState, CycleOutcome, CycleRecord, ZoneStats};

struct ZoneSlot {
    zone: ZoneId,
    alias: Option<String>,
    target: f64,
    mode: Option<TargetMode>,
    machine: Mutex<ZoneMachine>,
}

impl ZoneSlot {
    fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.zone.as_str())
    }
}

/// Drives every configured zone once per tick.
pub struct Orchestrator {
    state: Arc<AppState>,
    driver: Arc<dyn AcDriver>,
    validator: TelemetryValidator,
    zones: Vec<ZoneSlot>,
}

impl Orchestrator {
    /// Create an orchestrator for the zones in `state.config`.
    pub fn new(state: Arc<AppState>, driver: Arc<dyn AcDriver>) -> Result<Self, ConfigError> {
        let default_target = state.config.targets.t_target;
        let zones = state
            .config
            .zones
            .iter()
            .enumerate()
            .map(|(i, config)| {
                let zone = config.resolve(i)?;
                Ok(ZoneSlot {
                    machine: Mutex::new(ZoneMachine::new(zone.clone())),
                    zone,
                    alias: config.alias.clone(),
                    target: config.target.unwrap_or(default_target),
                    mode: config.mode,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            state,
            driver,
            validator: TelemetryValidator::default(),
            zones,
        })
    }

    /// Replace the telemetry validator.
    #[must_use]
    pub fn with_validator(mut self, validator: TelemetryValidator) -> Self {
        self.validator = validator;
        self
    }

    /// The shared state this orchestrator drives.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Zones under control, in configuration order.
    pub fn zones(&self) -> impl Iterator<Item = &ZoneId> {
        self.zones.iter().map(|slot| &slot.zone)
    }

    /// Start the control loop in the background.
    ///
    /// Stop it with [`LoopState::signal_stop`](crate::LoopState::signal_stop)
    /// and await the handle to let in-flight cycles finish.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the control loop until the stop signal fires.
    ///
    /// Ticks are aligned to wall-clock multiples of the resample interval.
    /// A tick that falls due while the runtime is busy is dropped, not
    /// replayed.
    pub async fn run(self: Arc<Self>) {
        if self.zones.is_empty() {
            info!("No zones configured for control");
            return;
        }

        let timing = &self.state.config.timing;
        let period = timing.tick_period();
        let delay = until_next_boundary(self.state.clock.now(), timing.resample_interval());

        info!(
            "Starting control loop for {} zone(s) with driver {} (interval: {}s, first tick in {}s)",
            self.zones.len(),
            self.driver.name(),
            period.as_secs(),
            delay.as_secs()
        );

        let mut ticker = interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stop_rx = self.state.control.subscribe_stop();
        let mut in_flight = JoinSet::new();
        self.state.control.mark_started(self.state.clock.now());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while let Some(joined) = in_flight.try_join_next() {
                        log_join(joined);
                    }
                    let this = Arc::clone(&self);
                    in_flight.spawn(async move {
                        this.run_cycle().await;
                    });
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight cycle(s)", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        self.state.control.mark_stopped();
        info!("Control loop stopped");
    }

    /// Run one tick for every zone concurrently and publish the records.
    pub async fn run_cycle(&self) -> Vec<CycleRecord> {
        let at = self.state.clock.now();
        let scheduled = self.state.schedule.mode_at(at);

        let outcomes = join_all(
            self.zones
                .iter()
                .map(|slot| self.run_zone(slot, slot.mode.unwrap_or(scheduled))),
        )
        .await;

        let mut records = Vec::with_capacity(outcomes.len());
        {
            let mut stats = self.state.control.zone_stats.write().await;
            for (slot, outcome) in self.zones.iter().zip(outcomes) {
                let entry = stats
                    .entry(slot.zone.clone())
                    .or_insert_with(|| ZoneStats::new(slot.zone.clone(), slot.alias.clone()));
                let record = CycleRecord::new(slot.zone.clone(), outcome, entry.is_faulted(), at);
                entry.apply(&record);
                log_outcome(slot, &record, entry.consecutive_failures);
                records.push(record);
            }
        }

        for record in &records {
            let _ = self.state.records_tx.send(record.clone());
        }

        let evicted = self.state.samples.compact();
        if evicted > 0 {
            trace!(evicted, "Compacted sample history");
        }
        let cycle = self.state.control.cycle_completed();
        debug!(cycle, zones = records.len(), "Control cycle complete");

        records
    }

    async fn run_zone(&self, slot: &ZoneSlot, mode: TargetMode) -> CycleOutcome {
        let Ok(mut machine) = slot.machine.try_lock() else {
            return CycleOutcome::Skipped;
        };

        match self.cycle(&mut machine, slot, mode).await {
            Ok(command) => CycleOutcome::Commanded { command },
            Err(reason) => {
                machine.fault(reason.clone());
                CycleOutcome::Faulted { reason }
            }
        }
    }

    async fn cycle(
        &self,
        machine: &mut ZoneMachine,
        slot: &ZoneSlot,
        mode: TargetMode,
    ) -> Result<Command, FaultReason> {
        let zone = &slot.zone;
        let state = &self.state;
        machine.begin()?;

        let telemetry = match self.call("sense", self.driver.sense(zone)).await {
            Ok(telemetry) => telemetry,
            Err(e) => {
                state.cache.invalidate(zone);
                return Err(FaultReason::Sense {
                    message: e.to_string(),
                });
            }
        };

        let validation = self.validator.validate(&telemetry);
        if !validation.is_valid {
            return Err(FaultReason::InvalidTelemetry {
                message: validation.summary(),
            });
        }
        if validation.has_warnings() {
            debug!(zone = %zone, "Telemetry warnings: {}", validation.summary());
        }

        let staged = telemetry.into_sample(zone.clone(), state.clock.now());
        state
            .samples
            .check_order(&staged)
            .map_err(|e| FaultReason::OutOfOrder {
                message: e.to_string(),
            })?;

        let device = match state.cache.get(zone) {
            Lookup::Fresh(device) => device,
            Lookup::Stale { last_known } => {
                debug!(
                    zone = %zone,
                    cached = last_known.is_some(),
                    "Device state stale, reading from controller"
                );
                match self.call("read", self.driver.read(zone)).await {
                    Ok(device) => {
                        let checked = self.validator.validate_state(&device);
                        if !checked.is_valid {
                            state.cache.invalidate(zone);
                            return Err(FaultReason::Refresh {
                                message: checked.summary(),
                            });
                        }
                        state.cache.put(zone, device.clone());
                        device
                    }
                    Err(e) => {
                        state.cache.invalidate(zone);
                        return Err(FaultReason::Refresh {
                            message: e.to_string(),
                        });
                    }
                }
            }
        };

        machine.advance(ZonePhase::Deciding)?;
        let timing = &state.config.timing;
        let history = state.samples.window(zone, timing.history());
        let mut resample = Resample::new(
            history.iter().chain(std::iter::once(&staged)),
            timing.resample_interval(),
        )
        .map_err(|e| FaultReason::Internal {
            message: e.to_string(),
        })?;
        if let Some(from) = state.clock.now().checked_sub(timing.history()) {
            resample = resample.floor(from);
        }
        let recent: Vec<_> = resample.collect();

        let target = ControlTarget {
            zone: zone.clone(),
            target_temperature: slot.target,
            mode,
        };
        let command = decide(&target, &device, &recent, &state.reactive)?;
        debug!(
            zone = %zone,
            mode = %mode,
            temperature = staged.measured_temperature,
            points = recent.len(),
            airflow = command.new_airflow_fraction,
            setpoint = command.new_set_temperature,
            "Decided"
        );

        machine.advance(ZonePhase::Commanding)?;
        if let Err(e) = self.call("write", self.driver.write(zone, &command)).await {
            state.cache.invalidate(zone);
            return Err(FaultReason::Command {
                message: e.to_string(),
            });
        }

        state.cache.put(zone, device.with_command(&command));
        let sample = Sample::new(
            zone.clone(),
            staged.timestamp,
            staged.measured_temperature,
            command.new_airflow_fraction,
            command.power_on(),
        );
        if let Err(e) = state.samples.record(sample) {
            warn!(zone = %zone, "Command accepted but sample not recorded: {}", e);
        }

        machine.advance(ZonePhase::Idle)?;
        Ok(command)
    }

    /// Bound a driver call by the configured timeout.
    async fn call<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = airtouch_core::Result<T>>,
    ) -> airtouch_core::Result<T> {
        let limit = self.state.config.timing.driver_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(airtouch_core::Error::timeout(operation, limit)),
        }
    }
}

/// Report a reaped cycle task. Returns whether it ran to completion.
fn log_join(joined: Result<(), JoinError>) -> bool {
    match joined {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            error!("Control cycle panicked; no records were published for that tick");
            false
        }
        Err(e) => {
            warn!("Control cycle did not complete: {}", e);
            false
        }
    }
}

fn log_outcome(slot: &ZoneSlot, record: &CycleRecord, consecutive_failures: u32) {
    match &record.outcome {
        CycleOutcome::Commanded { command } => {
            debug!(
                "Commanded {}: airflow {}%, setpoint {}°C",
                slot.name(),
                command.airflow_percent(),
                command.new_set_temperature
            );
        }
        CycleOutcome::Faulted { reason } => {
            if consecutive_failures <= 3 {
                warn!(
                    "Zone {} faulted: {} (attempt {})",
                    slot.name(),
                    reason,
                    consecutive_failures
                );
            } else if consecutive_failures == 4 {
                error!(
                    "Zone {} faulted {} times in a row, will continue trying silently",
                    slot.name(),
                    consecutive_failures
                );
            }
        }
        CycleOutcome::Skipped => {
            debug!("Zone {} still busy, skipping tick", slot.name());
        }
    }
}
