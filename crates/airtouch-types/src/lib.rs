//! Platform-agnostic types for AirTouch zone control.
//!
//! This crate provides the shared vocabulary of the controller: zone
//! identifiers, samples, device state, targets and commands. It has no
//! knowledge of the transport used to talk to the AC controller.
//!
//! # Example
//!
//! ```
//! use airtouch_types::{Command, ZoneId};
//!
//! let zone = ZoneId::new("bedroom").unwrap();
//! let cmd = Command {
//!     zone,
//!     new_airflow_fraction: 0.0,
//!     new_set_temperature: 24.0,
//! };
//! assert!(!cmd.power_on());
//! ```

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ParseError, ParseResult};
pub use types::{
    AcMode, Command, ControlTarget, DeviceState, ResampledPoint, Sample, TargetMode, ZoneId,
    ZoneTelemetry,
};
