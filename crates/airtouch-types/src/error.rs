//! Error types for value parsing in airtouch-types.

use thiserror::Error;

/// Errors that can occur when parsing AirTouch identifiers and modes.
///
/// This error type is transport-agnostic and does not include
/// driver errors (those belong in airtouch-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Zone identifiers must contain at least one non-whitespace character.
    #[error("Zone identifier cannot be empty")]
    EmptyZoneId,

    /// Unrecognized AC mode name.
    #[error("Unknown AC mode: '{0}'")]
    UnknownAcMode(String),

    /// Unrecognized AC mode code reported by the controller.
    #[error("Unknown AC mode code: {0}")]
    UnknownAcModeCode(u8),

    /// Unrecognized target mode name.
    #[error("Unknown target mode: '{0}'")]
    UnknownTargetMode(String),
}

/// Result type alias using airtouch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
