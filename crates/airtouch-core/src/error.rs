//! Error types for airtouch-core.
//!
//! Two families live here:
//!
//! - [`Error`]: anything that goes wrong talking to the AC controller through
//!   an [`AcDriver`](crate::AcDriver). The control loop treats every driver
//!   error as transient and local to the zone being processed; the zone is
//!   faulted for the current cycle and retried on the next tick.
//! - [`DecideError`]: the two conditions under which the reactive controller
//!   refuses to produce a command. Both are recoverable by skipping the zone
//!   for one cycle.
//!
//! | Error | Typical cause | Loop reaction |
//! |-------|---------------|---------------|
//! | [`Error::Timeout`] | Controller busy or network congestion | Fault zone, retry next tick |
//! | [`Error::ConnectionFailed`] | Controller offline | Fault zone, retry next tick |
//! | [`Error::ZoneNotFound`] | Zone removed on the controller | Fault zone every tick until config changes |
//! | [`Error::WriteFailed`] | Command rejected | Fault zone, invalidate cached state |
//! | [`Error::InvalidData`] | Implausible telemetry | Fault zone, sample discarded |
//! | [`DecideError::InsufficientData`] | No samples in the history window | Skip zone |
//! | [`DecideError::InvalidTarget`] | Target outside advertised setpoint range | Skip zone |

use std::time::Duration;

use thiserror::Error;

use airtouch_types::{ParseError, ZoneId};

/// Errors that can occur when talking to an AirTouch controller.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The controller does not know this zone.
    #[error("Zone not found: {0}")]
    ZoneNotFound(ZoneId),

    /// Could not reach the controller.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Controller address, when known.
        host: Option<String>,
        /// Structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The controller rejected a command.
    #[error("Write to zone {zone} failed: {reason}")]
    WriteFailed {
        /// Zone the command targeted.
        zone: ZoneId,
        /// The reason for the failure.
        reason: String,
    },

    /// Data received from the controller could not be used.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Structured reasons for connection failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Nothing answered at the configured address.
    Unreachable,
    /// The controller refused the connection.
    Refused,
    /// The controller closed the connection mid-exchange.
    Reset,
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable => write!(f, "controller unreachable"),
            Self::Refused => write!(f, "connection refused by controller"),
            Self::Reset => write!(f, "connection reset by controller"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a write failure for a zone.
    pub fn write_failed(zone: &ZoneId, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            zone: zone.clone(),
            reason: reason.into(),
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(host: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { host, reason }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidData(err.to_string())
    }
}

/// Result type alias using airtouch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons the reactive controller declines to produce a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecideError {
    /// No resampled points were available for the zone.
    #[error("Insufficient data for zone {zone}: no samples in the history window")]
    InsufficientData {
        /// Zone being decided.
        zone: ZoneId,
    },

    /// The effective target lies outside the setpoint range the unit advertises.
    #[error("Target {target}°C for zone {zone} is outside the supported range {min}-{max}°C")]
    InvalidTarget {
        /// Zone being decided.
        zone: ZoneId,
        /// The rejected target temperature.
        target: f64,
        /// Lowest accepted setpoint.
        min: f64,
        /// Highest accepted setpoint.
        max: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> ZoneId {
        ZoneId::new("living").unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = Error::ZoneNotFound(zone());
        assert_eq!(err.to_string(), "Zone not found: living");

        let err = Error::timeout("read", Duration::from_secs(10));
        assert!(err.to_string().contains("read"));
        assert!(err.to_string().contains("10s"));

        let err = Error::write_failed(&zone(), "busy");
        assert_eq!(err.to_string(), "Write to zone living failed: busy");

        let err = Error::connection_failed(
            Some("192.168.1.7".to_string()),
            ConnectionFailureReason::Unreachable,
        );
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::UnknownAcModeCode(7).into();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_decide_error_display() {
        let err = DecideError::InsufficientData { zone: zone() };
        assert!(err.to_string().contains("living"));

        let err = DecideError::InvalidTarget {
            zone: zone(),
            target: 35.0,
            min: 16.0,
            max: 30.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("35"));
        assert!(msg.contains("16-30"));
    }
}
