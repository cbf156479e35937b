//! In-memory state for AirTouch zone control.
//!
//! This crate provides the two shared stores the control loop reads and
//! writes every cycle:
//!
//! - [`SampleStore`]: append-only per-zone history of temperature samples,
//!   with time-window queries and fixed-interval [`Resample`]ing
//! - [`DeviceCache`]: TTL-bounded last-known [`DeviceState`] per zone
//!
//! Both take an `Arc<dyn Clock>` so tests can drive time explicitly, and
//! both lock per zone (or only briefly), so concurrent per-zone tasks do
//! not serialize on each other.
//!
//! Nothing here is persisted; history is rebuilt from live telemetry after a
//! restart.
//!
//! [`DeviceState`]: airtouch_types::DeviceState

mod cache;
mod error;
mod resample;
mod samples;

pub use cache::{DeviceCache, Lookup};
pub use error::{Error, Result};
pub use resample::Resample;
pub use samples::{DEFAULT_ZONE_CAPACITY, SampleStore, StoreConfig};
