//! Per-zone control cycle state machine.
//!
//! Each zone moves through
//!
//! ```text
//! Idle -> Refreshing -> Deciding -> Commanding -> Idle
//! ```
//!
//! once per tick. Any active step may fault instead; a faulted zone starts
//! over from `Idle` on its next tick. Illegal moves are rejected with a
//! [`TransitionError`] rather than silently accepted.

use serde::Serialize;

use airtouch_core::DecideError;
use airtouch_types::ZoneId;

/// Why a zone's cycle ended without a command.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultReason {
    /// Sensing telemetry failed or timed out.
    #[error("sense failed: {message}")]
    Sense { message: String },

    /// Telemetry was implausible.
    #[error("invalid telemetry: {message}")]
    InvalidTelemetry { message: String },

    /// Telemetry was older than the zone's stored history.
    #[error("{message}")]
    OutOfOrder { message: String },

    /// The cache was stale and reading device state failed.
    #[error("refresh failed: {message}")]
    Refresh { message: String },

    /// No history to decide from.
    #[error("insufficient data in the history window")]
    InsufficientData,

    /// The target lies outside the unit's setpoint range.
    #[error("target {target}°C outside unit range {min}-{max}°C")]
    InvalidTarget { target: f64, min: f64, max: f64 },

    /// Writing the command failed or timed out.
    #[error("command failed: {message}")]
    Command { message: String },

    /// The cycle tried an illegal step.
    #[error("{message}")]
    Internal { message: String },
}

impl From<DecideError> for FaultReason {
    fn from(err: DecideError) -> Self {
        match err {
            DecideError::InsufficientData { .. } => FaultReason::InsufficientData,
            DecideError::InvalidTarget {
                target, min, max, ..
            } => FaultReason::InvalidTarget { target, min, max },
        }
    }
}

impl From<TransitionError> for FaultReason {
    fn from(err: TransitionError) -> Self {
        FaultReason::Internal {
            message: err.to_string(),
        }
    }
}

/// Where a zone is in its control cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ZonePhase {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// Sensing telemetry and refreshing device state.
    Refreshing,
    /// Running the controller.
    Deciding,
    /// Writing the command.
    Commanding,
    /// The last cycle failed.
    Faulted(FaultReason),
}

impl ZonePhase {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ZonePhase::Idle => "idle",
            ZonePhase::Refreshing => "refreshing",
            ZonePhase::Deciding => "deciding",
            ZonePhase::Commanding => "commanding",
            ZonePhase::Faulted(_) => "faulted",
        }
    }

    /// Whether a cycle is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ZonePhase::Refreshing | ZonePhase::Deciding | ZonePhase::Commanding
        )
    }

    /// Whether moving from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: &ZonePhase) -> bool {
        use ZonePhase::*;
        matches!(
            (self, next),
            (Idle, Refreshing)
                | (Refreshing, Deciding)
                | (Deciding, Commanding)
                | (Commanding, Idle)
                | (Faulted(_), Idle)
        ) || (self.is_active() && matches!(next, Faulted(_)))
    }
}

impl std::fmt::Display for ZonePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZonePhase::Faulted(reason) => write!(f, "faulted ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// An illegal phase change.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("zone {zone}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub zone: ZoneId,
    pub from: &'static str,
    pub to: &'static str,
}

/// The state machine for one zone.
#[derive(Debug, Clone)]
pub struct ZoneMachine {
    zone: ZoneId,
    phase: ZonePhase,
}

impl ZoneMachine {
    /// A machine for `zone`, starting idle.
    pub fn new(zone: ZoneId) -> Self {
        Self {
            zone,
            phase: ZonePhase::Idle,
        }
    }

    /// The zone this machine drives.
    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// The current phase.
    pub fn phase(&self) -> &ZonePhase {
        &self.phase
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn advance(&mut self, next: ZonePhase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(&next) {
            return Err(TransitionError {
                zone: self.zone.clone(),
                from: self.phase.name(),
                to: next.name(),
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Start a new cycle, clearing a previous fault.
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        if matches!(self.phase, ZonePhase::Faulted(_)) {
            self.advance(ZonePhase::Idle)?;
        }
        self.advance(ZonePhase::Refreshing)
    }

    /// End the current cycle with a fault.
    ///
    /// Faulting is legal from every active phase; from anywhere else the
    /// phase is forced so the fault is never lost.
    pub fn fault(&mut self, reason: FaultReason) {
        let next = ZonePhase::Faulted(reason);
        if self.advance(next.clone()).is_err() {
            self.phase = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ZoneMachine {
        ZoneMachine::new(ZoneId::new("den").unwrap())
    }

    fn reason() -> FaultReason {
        FaultReason::Command {
            message: "unit busy".to_string(),
        }
    }

    #[test]
    fn test_happy_path() {
        let mut m = machine();
        assert_eq!(m.phase(), &ZonePhase::Idle);
        m.begin().unwrap();
        assert_eq!(m.phase(), &ZonePhase::Refreshing);
        m.advance(ZonePhase::Deciding).unwrap();
        m.advance(ZonePhase::Commanding).unwrap();
        m.advance(ZonePhase::Idle).unwrap();
        assert_eq!(m.phase(), &ZonePhase::Idle);
    }

    #[test]
    fn test_fault_from_every_active_phase() {
        for steps in 1..=3 {
            let mut m = machine();
            m.begin().unwrap();
            let path = [ZonePhase::Deciding, ZonePhase::Commanding];
            for phase in path.iter().take(steps - 1) {
                m.advance(phase.clone()).unwrap();
            }
            m.advance(ZonePhase::Faulted(reason())).unwrap();
            assert!(matches!(m.phase(), ZonePhase::Faulted(_)));
        }
    }

    #[test]
    fn test_faulted_resets_on_begin() {
        let mut m = machine();
        m.begin().unwrap();
        m.fault(reason());
        assert_eq!(m.phase(), &ZonePhase::Faulted(reason()));

        m.begin().unwrap();
        assert_eq!(m.phase(), &ZonePhase::Refreshing);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut m = machine();
        let err = m.advance(ZonePhase::Commanding).unwrap_err();
        assert_eq!(err.from, "idle");
        assert_eq!(err.to, "commanding");
        assert!(err.to_string().contains("den"));

        assert!(m.advance(ZonePhase::Faulted(reason())).is_err());

        m.begin().unwrap();
        assert!(m.advance(ZonePhase::Idle).is_err());
        assert!(m.begin().is_err());
        assert_eq!(m.phase(), &ZonePhase::Refreshing);
    }

    #[test]
    fn test_fault_is_never_lost() {
        let mut m = machine();
        m.fault(reason());
        assert!(matches!(m.phase(), ZonePhase::Faulted(_)));
    }

    #[test]
    fn test_decide_error_conversion() {
        let zone = ZoneId::new("den").unwrap();
        let reason: FaultReason = DecideError::InsufficientData { zone: zone.clone() }.into();
        assert_eq!(reason, FaultReason::InsufficientData);

        let reason: FaultReason = DecideError::InvalidTarget {
            zone,
            target: 40.0,
            min: 16.0,
            max: 30.0,
        }
        .into();
        assert!(reason.to_string().contains("40"));
    }

    #[test]
    fn test_fault_reason_serializes_with_kind() {
        let json = serde_json::to_value(reason()).unwrap();
        assert_eq!(json["kind"], "command");
        assert_eq!(json["message"], "unit busy");

        let json = serde_json::to_value(FaultReason::InsufficientData).unwrap();
        assert_eq!(json["kind"], "insufficient_data");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ZonePhase::Deciding.to_string(), "deciding");
        assert_eq!(
            ZonePhase::Faulted(reason()).to_string(),
            "faulted (command failed: unit busy)"
        );
    }
}
