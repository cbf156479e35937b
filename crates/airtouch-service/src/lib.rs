//! Closed-loop zone controller for AirTouch air conditioners.
//!
//! This crate provides a daemon that:
//! - Senses every configured zone once per resample interval
//! - Keeps a short per-zone temperature history and a TTL-bounded cache of
//!   device state
//! - Runs the reactive controller for each zone and writes the resulting
//!   airflow and setpoint back to the AC controller
//! - Publishes one [`CycleRecord`] per zone per tick and keeps per-zone
//!   [`ZoneStats`]
//!
//! Zones are independent: a zone that faults is flagged and retried on the
//! next tick while the others carry on.
//!
//! # Configuration
//!
//! The controller reads configuration from `~/.config/airtouch/controller.toml`:
//!
//! ```toml
//! [controller]
//! airflow_group_min = 0.1
//! airflow_ramp_degree = 0.1
//!
//! [targets]
//! T_target = 22.0
//! T_target_sleep = 24.0
//! sleep_start = "00:00"
//! sleep_end = "06:00"
//!
//! [timing]
//! cache_ttl_minutes = 5
//! history_minutes = 60
//! resample_interval_minutes = 1
//!
//! [[zones]]
//! id = "living"
//! alias = "Living Room"
//!
//! [[zones]]
//! id = "bed1"
//! target = 21.0
//! ```

pub mod config;
pub mod machine;
pub mod orchestrator;
pub mod schedule;
pub mod simulate;
pub mod state;

pub use config::{
    Config, ConfigError, ControllerConfig, MAX_HISTORY_MINUTES, TargetsConfig, TimingConfig,
    ValidationError, ZoneConfig, default_config_path,
};
pub use machine::{FaultReason, TransitionError, ZoneMachine, ZonePhase};
pub use orchestrator::Orchestrator;
pub use schedule::{ScheduleError, SleepSchedule};
pub use simulate::simulated_driver;
pub use state::{AppState, CycleOutcome, CycleRecord, LoopState, ZoneStats};
