//! Reactive zone controller.
//!
//! [`decide`] turns the temperature error of one zone, the trend of its
//! recent resampled history and the zone's current airflow into the next
//! [`Command`]. It is a pure function: identical inputs always produce an
//! identical command, and the ramp baseline is whatever `state` says the
//! zone is doing now.
//!
//! The airflow path is:
//!
//! 1. `e = target - latest temperature`
//! 2. `proposal = airflow_gain * |e| - damping_factor * correcting_rate`
//! 3. clamp the proposal to `[airflow_group_min, 1.0]` (or `0.0` when the
//!    zone should be off)
//! 4. move from `state.airflow_fraction` toward it by at most
//!    `airflow_ramp_degree`
//!
//! The setpoint moves one `setpoint_step` per cycle: it is pushed past the
//! target while the dampers are already wide open and relaxed back toward
//! the target otherwise.

use serde::{Deserialize, Serialize};

use airtouch_types::{AcMode, Command, ControlTarget, DeviceState, ResampledPoint, TargetMode};

use crate::error::DecideError;

/// Default minimum non-zero airflow fraction.
pub const DEFAULT_AIRFLOW_GROUP_MIN: f64 = 0.1;
/// Default maximum airflow change per cycle.
pub const DEFAULT_AIRFLOW_RAMP_DEGREE: f64 = 0.1;
/// Default dead-band half-width in degrees Celsius.
pub const DEFAULT_DEAD_BAND: f64 = 0.3;

/// Tuning parameters of the reactive controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactiveConfig {
    /// Smallest airflow fraction a powered-on zone may be commanded to.
    pub airflow_group_min: f64,
    /// Largest airflow change allowed in one cycle while the zone stays on.
    pub airflow_ramp_degree: f64,
    /// Errors with magnitude at or below this are left alone.
    pub dead_band: f64,
    /// Weight of the correcting trend (°C/minute) subtracted from the proposal.
    pub damping_factor: f64,
    /// Airflow fraction requested per degree of error.
    pub airflow_gain: f64,
    /// Setpoint change applied per cycle.
    pub setpoint_step: f64,
    /// Airflow above which the setpoint is pushed past the target.
    pub setpoint_push_airflow: f64,
    /// Target temperature substituted while the zone is in sleep mode.
    pub t_target_sleep: f64,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            airflow_group_min: DEFAULT_AIRFLOW_GROUP_MIN,
            airflow_ramp_degree: DEFAULT_AIRFLOW_RAMP_DEGREE,
            dead_band: DEFAULT_DEAD_BAND,
            damping_factor: 0.5,
            airflow_gain: 1.0,
            setpoint_step: 1.0,
            setpoint_push_airflow: 0.5,
            t_target_sleep: 24.0,
        }
    }
}

impl ReactiveConfig {
    /// Set the minimum non-zero airflow.
    #[must_use]
    pub fn airflow_group_min(mut self, min: f64) -> Self {
        self.airflow_group_min = min;
        self
    }

    /// Set the per-cycle ramp limit.
    #[must_use]
    pub fn airflow_ramp_degree(mut self, ramp: f64) -> Self {
        self.airflow_ramp_degree = ramp;
        self
    }

    /// Set the dead-band half-width.
    #[must_use]
    pub fn dead_band(mut self, dead_band: f64) -> Self {
        self.dead_band = dead_band;
        self
    }

    /// Set the trend damping factor.
    #[must_use]
    pub fn damping_factor(mut self, damping: f64) -> Self {
        self.damping_factor = damping;
        self
    }

    /// Set the sleep-mode target temperature.
    #[must_use]
    pub fn t_target_sleep(mut self, target: f64) -> Self {
        self.t_target_sleep = target;
        self
    }

    /// Target temperature the controller aims for under `target`.
    pub fn effective_target(&self, target: &ControlTarget) -> f64 {
        match target.mode {
            TargetMode::Sleep => self.t_target_sleep,
            TargetMode::Awake | TargetMode::Off => target.target_temperature,
        }
    }
}

/// Which way the AC unit is pushing the zone temperature this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Cooling,
    Heating,
}

/// Compute the next command for one zone.
///
/// `recent` must be ordered by bucket timestamp; only the first and last
/// points are used for the trend, the last one for the error.
///
/// # Errors
///
/// - [`DecideError::InvalidTarget`] if the effective target lies outside
///   the setpoint range advertised by `state`
/// - [`DecideError::InsufficientData`] if `recent` is empty
///
/// A zone whose target mode is off, whose AC unit is powered down, or whose
/// AC is in fan or dry mode is always commanded to airflow `0.0` with its
/// setpoint untouched, without consulting the history.
///
/// # Example
///
/// ```
/// use airtouch_core::reactive::{decide, ReactiveConfig};
/// use airtouch_types::{AcMode, ControlTarget, DeviceState, ResampledPoint, TargetMode, ZoneId};
/// use time::OffsetDateTime;
///
/// let zone = ZoneId::new("bedroom").unwrap();
/// let target = ControlTarget { zone: zone.clone(), target_temperature: 22.0, mode: TargetMode::Awake };
/// let state = DeviceState {
///     zone,
///     set_temperature: 22.0,
///     airflow_fraction: 0.2,
///     power_on: true,
///     ac_mode: AcMode::Cool,
///     setpoint_min: 16.0,
///     setpoint_max: 30.0,
///     last_refreshed: OffsetDateTime::UNIX_EPOCH,
/// };
/// let recent = [ResampledPoint {
///     timestamp: OffsetDateTime::UNIX_EPOCH,
///     mean_temperature: 25.0,
///     mean_airflow_fraction: 0.2,
///     sample_count: 1,
/// }];
///
/// let config = ReactiveConfig::default().airflow_group_min(0.2);
/// let cmd = decide(&target, &state, &recent, &config).unwrap();
/// assert!((cmd.new_airflow_fraction - 0.3).abs() < 1e-9);
/// ```
pub fn decide(
    target: &ControlTarget,
    state: &DeviceState,
    recent: &[ResampledPoint],
    config: &ReactiveConfig,
) -> Result<Command, DecideError> {
    if target.mode == TargetMode::Off || !state.power_on || !state.ac_mode.is_conditioning() {
        return Ok(command(state, 0.0, state.set_temperature));
    }

    let effective = config.effective_target(target);
    if !state.accepts_setpoint(effective) {
        return Err(DecideError::InvalidTarget {
            zone: target.zone.clone(),
            target: effective,
            min: state.setpoint_min,
            max: state.setpoint_max,
        });
    }

    let (Some(first), Some(latest)) = (recent.first(), recent.last()) else {
        return Err(DecideError::InsufficientData {
            zone: target.zone.clone(),
        });
    };

    let error = effective - latest.mean_temperature;
    let baseline = state.airflow_fraction;

    // Inclusive: sitting exactly on the boundary is not worth actuating.
    if error.abs() <= config.dead_band {
        return Ok(command(
            state,
            normalize(baseline, config),
            state.set_temperature,
        ));
    }

    let direction = match state.ac_mode {
        AcMode::Cool => Direction::Cooling,
        AcMode::Heat => Direction::Heating,
        _ if error < 0.0 => Direction::Cooling,
        _ => Direction::Heating,
    };

    let correctable = match direction {
        Direction::Cooling => error < 0.0,
        Direction::Heating => error > 0.0,
    };
    if !correctable {
        // The zone overshot in the direction the unit is conditioning.
        let setpoint = relax_setpoint(state, effective, direction, config);
        return Ok(command(state, 0.0, setpoint));
    }

    let correcting_rate = trend(first, latest) * error.signum();
    let proposal = config.airflow_gain * error.abs() - config.damping_factor * correcting_rate;
    let clamped = proposal.clamp(config.airflow_group_min, 1.0);
    let airflow = ramp(baseline, clamped, config);

    let setpoint = if baseline > config.setpoint_push_airflow {
        push_setpoint(state, direction, config)
    } else {
        relax_setpoint(state, effective, direction, config)
    };

    Ok(command(state, airflow, setpoint))
}

fn command(state: &DeviceState, airflow: f64, setpoint: f64) -> Command {
    Command {
        zone: state.zone.clone(),
        new_airflow_fraction: airflow,
        new_set_temperature: setpoint,
    }
}

/// Temperature slope in °C per minute between two resampled points.
fn trend(first: &ResampledPoint, latest: &ResampledPoint) -> f64 {
    let minutes = (latest.timestamp - first.timestamp).as_seconds_f64() / 60.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    (latest.mean_temperature - first.mean_temperature) / minutes
}

/// Map an arbitrary airflow into `{0} ∪ [min, 1]`.
fn normalize(airflow: f64, config: &ReactiveConfig) -> f64 {
    if airflow <= 0.0 {
        0.0
    } else {
        airflow.clamp(config.airflow_group_min, 1.0)
    }
}

/// Step from `baseline` toward `proposal` by at most the ramp limit.
///
/// Switching off is immediate. Switching on, or starting from an opening
/// below the minimum, lands on the minimum.
fn ramp(baseline: f64, proposal: f64, config: &ReactiveConfig) -> f64 {
    if proposal <= 0.0 {
        return 0.0;
    }
    if baseline < config.airflow_group_min {
        return config.airflow_group_min;
    }
    let from = baseline.min(1.0);
    let step = (proposal - from).clamp(-config.airflow_ramp_degree, config.airflow_ramp_degree);
    (from + step).clamp(config.airflow_group_min, 1.0)
}

fn push_setpoint(state: &DeviceState, direction: Direction, config: &ReactiveConfig) -> f64 {
    let next = match direction {
        Direction::Cooling => state.set_temperature - config.setpoint_step,
        Direction::Heating => state.set_temperature + config.setpoint_step,
    };
    next.clamp(state.setpoint_min, state.setpoint_max)
}

fn relax_setpoint(
    state: &DeviceState,
    effective: f64,
    direction: Direction,
    config: &ReactiveConfig,
) -> f64 {
    let next = match direction {
        Direction::Cooling => (state.set_temperature + config.setpoint_step).min(effective),
        Direction::Heating => (state.set_temperature - config.setpoint_step).max(effective),
    };
    next.clamp(state.setpoint_min, state.setpoint_max)
}
