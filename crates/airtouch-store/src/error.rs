//! Error types for airtouch-store.

use time::{Duration, OffsetDateTime};

use airtouch_types::ZoneId;

/// Result type for airtouch-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airtouch-store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A sample was older than the newest one already stored for its zone.
    #[error("Out-of-order sample for zone {zone}: {attempted} precedes {last}")]
    OutOfOrderSample {
        zone: ZoneId,
        last: OffsetDateTime,
        attempted: OffsetDateTime,
    },

    /// Resampling interval shorter than one second.
    #[error("Invalid resampling interval: {0}")]
    InvalidInterval(Duration),
}
