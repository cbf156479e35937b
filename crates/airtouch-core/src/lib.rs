//! Reactive zone control for AirTouch-class air conditioners.
//!
//! This crate holds the two pieces of the controller that do not care how
//! the loop around them is scheduled:
//!
//! - **Reactive controller** ([`reactive::decide`]): a pure function turning
//!   temperature error and recent trend into a bounded, ramp-limited airflow
//!   and setpoint command for one zone
//! - **Driver abstraction** ([`AcDriver`]): the `sense`/`read`/`write`
//!   contract the control loop uses to talk to the AC controller, with an
//!   in-memory [`MockDriver`] for tests and simulation
//!
//! It also provides [`TelemetryValidator`] for rejecting implausible
//! readings before they are recorded.
//!
//! # Quick Start
//!
//! ```
//! use airtouch_core::{AcDriver, MockDriver, MockZone, ReactiveConfig, decide};
//! use airtouch_types::{ControlTarget, ResampledPoint, TargetMode, ZoneId};
//! use time::OffsetDateTime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let zone = ZoneId::new("living")?;
//!     let driver = MockDriver::builder()
//!         .zone(MockZone::new(zone.clone()).temperature(25.0))
//!         .build();
//!
//!     let telemetry = driver.sense(&zone).await?;
//!     let state = driver.read(&zone).await?;
//!     let recent = [ResampledPoint {
//!         timestamp: OffsetDateTime::now_utc(),
//!         mean_temperature: telemetry.temperature,
//!         mean_airflow_fraction: telemetry.airflow_fraction,
//!         sample_count: 1,
//!     }];
//!     let target = ControlTarget {
//!         zone: zone.clone(),
//!         target_temperature: 22.0,
//!         mode: TargetMode::Awake,
//!     };
//!
//!     let command = decide(&target, &state, &recent, &ReactiveConfig::default())?;
//!     driver.write(&zone, &command).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod reactive;
pub mod traits;
pub mod validation;

pub use error::{ConnectionFailureReason, DecideError, Error, Result};
pub use mock::{MockDriver, MockDriverBuilder, MockOp, MockZone};
pub use reactive::{ReactiveConfig, decide};
pub use traits::{AcDriver, Ack};
pub use validation::{TelemetryValidator, ValidationResult, ValidationWarning, ValidatorConfig};

// Re-export from airtouch-types
pub use airtouch_types::{
    AcMode, Command, ControlTarget, DeviceState, ResampledPoint, Sample, TargetMode, ZoneId,
    ZoneTelemetry,
};
