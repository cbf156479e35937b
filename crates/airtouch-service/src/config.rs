//! Controller configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use airtouch_core::ReactiveConfig;
use airtouch_types::{ParseError, TargetMode, ZoneId};

use crate::schedule::{SleepSchedule, parse_time_of_day};

/// Controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reactive controller tuning.
    pub controller: ControllerConfig,
    /// Comfort targets and the sleep window.
    pub targets: TargetsConfig,
    /// Loop, history and cache timing.
    pub timing: TimingConfig,
    /// Zones to control.
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every error found.
    ///
    /// This checks:
    /// - Controller tuning is inside its usable range
    /// - Targets are plausible and the sleep window parses as `HH:MM`
    /// - The resample interval divides an hour and fits inside the history
    /// - Zone ids are present and unique
    ///
    /// # Example
    ///
    /// ```
    /// use airtouch_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.controller.validate());
        errors.extend(self.targets.validate());
        errors.extend(self.timing.validate());

        let mut seen = std::collections::HashSet::new();
        for (i, zone) in self.zones.iter().enumerate() {
            let prefix = format!("zones[{}]", i);
            errors.extend(zone.validate(&prefix));

            if !seen.insert(zone.id.trim()) {
                errors.push(ValidationError {
                    field: format!("{}.id", prefix),
                    message: format!("duplicate zone id '{}'", zone.id),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Controller tuning in the form [`airtouch_core::decide`] takes.
    pub fn reactive(&self) -> ReactiveConfig {
        let c = &self.controller;
        ReactiveConfig {
            airflow_group_min: c.airflow_group_min,
            airflow_ramp_degree: c.airflow_ramp_degree,
            dead_band: c.dead_band,
            damping_factor: c.damping_factor,
            airflow_gain: c.airflow_gain,
            setpoint_step: c.setpoint_step,
            setpoint_push_airflow: c.setpoint_push_airflow,
            t_target_sleep: self.targets.t_target_sleep,
        }
    }

    /// The sleep window described by `[targets]`.
    pub fn sleep_schedule(&self) -> Result<SleepSchedule, ConfigError> {
        SleepSchedule::from_config(&self.targets).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "targets".to_string(),
                message: e.to_string(),
            }])
        })
    }
}

/// Reactive controller tuning (`[controller]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Minimum non-zero airflow fraction.
    pub airflow_group_min: f64,
    /// Maximum airflow change per cycle.
    pub airflow_ramp_degree: f64,
    /// Dead-band half-width in degrees Celsius.
    pub dead_band: f64,
    /// Weight of the temperature trend.
    pub damping_factor: f64,
    /// Airflow fraction per degree of error.
    pub airflow_gain: f64,
    /// Setpoint change per cycle.
    pub setpoint_step: f64,
    /// Airflow above which the setpoint is pushed past the target.
    pub setpoint_push_airflow: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let r = ReactiveConfig::default();
        Self {
            airflow_group_min: r.airflow_group_min,
            airflow_ramp_degree: r.airflow_ramp_degree,
            dead_band: r.dead_band,
            damping_factor: r.damping_factor,
            airflow_gain: r.airflow_gain,
            setpoint_step: r.setpoint_step,
            setpoint_push_airflow: r.setpoint_push_airflow,
        }
    }
}

impl ControllerConfig {
    /// Validate controller tuning.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: format!("controller.{}", field),
                message,
            });
        };

        if !(self.airflow_group_min > 0.0 && self.airflow_group_min <= 1.0) {
            push(
                "airflow_group_min",
                format!("{} must be in (0, 1]", self.airflow_group_min),
            );
        }
        if !(self.airflow_ramp_degree > 0.0 && self.airflow_ramp_degree <= 1.0) {
            push(
                "airflow_ramp_degree",
                format!("{} must be in (0, 1]", self.airflow_ramp_degree),
            );
        }
        if !(self.dead_band >= 0.0 && self.dead_band.is_finite()) {
            push(
                "dead_band",
                format!("{} must be a non-negative number", self.dead_band),
            );
        }
        if !(self.damping_factor >= 0.0 && self.damping_factor.is_finite()) {
            push(
                "damping_factor",
                format!("{} must be a non-negative number", self.damping_factor),
            );
        }
        if !(self.airflow_gain > 0.0 && self.airflow_gain.is_finite()) {
            push(
                "airflow_gain",
                format!("{} must be greater than 0", self.airflow_gain),
            );
        }
        if !(self.setpoint_step > 0.0 && self.setpoint_step <= 5.0) {
            push(
                "setpoint_step",
                format!("{} must be in (0, 5] degrees", self.setpoint_step),
            );
        }
        if !(0.0..=1.0).contains(&self.setpoint_push_airflow) {
            push(
                "setpoint_push_airflow",
                format!("{} must be in [0, 1]", self.setpoint_push_airflow),
            );
        }

        errors
    }
}

/// Lowest comfort target accepted from configuration, in degrees Celsius.
pub const MIN_TARGET: f64 = 10.0;
/// Highest comfort target accepted from configuration, in degrees Celsius.
pub const MAX_TARGET: f64 = 35.0;

/// Comfort targets and the daily sleep window (`[targets]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Awake target temperature.
    #[serde(rename = "T_target")]
    pub t_target: f64,
    /// Sleep target temperature.
    #[serde(rename = "T_target_sleep")]
    pub t_target_sleep: f64,
    /// Local time the sleep window opens (`HH:MM`).
    pub sleep_start: String,
    /// Local time the sleep window closes (`HH:MM`).
    pub sleep_end: String,
    /// Offset of local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            t_target: 22.0,
            t_target_sleep: 24.0,
            sleep_start: "00:00".to_string(),
            sleep_end: "06:00".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

impl TargetsConfig {
    /// Validate targets and the sleep window.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [("T_target", self.t_target), ("T_target_sleep", self.t_target_sleep)] {
            if !(MIN_TARGET..=MAX_TARGET).contains(&value) {
                errors.push(ValidationError {
                    field: format!("targets.{}", field),
                    message: format!(
                        "{} is outside the plausible range {}-{}°C",
                        value, MIN_TARGET, MAX_TARGET
                    ),
                });
            }
        }

        for (field, value) in [("sleep_start", &self.sleep_start), ("sleep_end", &self.sleep_end)] {
            if let Err(e) = parse_time_of_day(value) {
                errors.push(ValidationError {
                    field: format!("targets.{}", field),
                    message: e.to_string(),
                });
            }
        }

        if self.utc_offset_minutes.abs() >= 24 * 60 {
            errors.push(ValidationError {
                field: "targets.utc_offset_minutes".to_string(),
                message: format!(
                    "offset {} must be less than a day in either direction",
                    self.utc_offset_minutes
                ),
            });
        }

        errors
    }
}

/// Longest history the controller keeps: one week, which is the per-zone
/// sample capacity at one sample a minute.
pub const MAX_HISTORY_MINUTES: u64 = 7 * 24 * 60;

/// Loop, history and cache timing (`[timing]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a refreshed device state stays fresh.
    pub cache_ttl_minutes: u64,
    /// How much history the controller looks back over.
    pub history_minutes: u64,
    /// Control cycle period and resampling bucket width.
    pub resample_interval_minutes: u64,
    /// Upper bound on any single driver call.
    pub driver_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: 5,
            history_minutes: 60,
            resample_interval_minutes: 1,
            driver_timeout_secs: 10,
        }
    }
}

impl TimingConfig {
    /// Validate timing.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let interval = self.resample_interval_minutes;
        if interval == 0 || interval > 60 || 60 % interval != 0 {
            errors.push(ValidationError {
                field: "timing.resample_interval_minutes".to_string(),
                message: format!("{} must be a divisor of 60", interval),
            });
        }

        if self.cache_ttl_minutes == 0 {
            errors.push(ValidationError {
                field: "timing.cache_ttl_minutes".to_string(),
                message: "cache TTL cannot be 0".to_string(),
            });
        }

        if self.cache_ttl_minutes > self.history_minutes {
            errors.push(ValidationError {
                field: "timing.cache_ttl_minutes".to_string(),
                message: format!(
                    "cache TTL of {} minutes exceeds the {}-minute history",
                    self.cache_ttl_minutes, self.history_minutes
                ),
            });
        }

        if self.history_minutes > MAX_HISTORY_MINUTES {
            errors.push(ValidationError {
                field: "timing.history_minutes".to_string(),
                message: format!(
                    "history of {} minutes exceeds the maximum of {}",
                    self.history_minutes, MAX_HISTORY_MINUTES
                ),
            });
        } else if self.history_minutes < interval.max(1) {
            errors.push(ValidationError {
                field: "timing.history_minutes".to_string(),
                message: format!(
                    "history of {} minutes is shorter than the resample interval",
                    self.history_minutes
                ),
            });
        }

        if self.driver_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "timing.driver_timeout_secs".to_string(),
                message: "driver timeout cannot be 0".to_string(),
            });
        } else if interval > 0 && self.driver_timeout_secs >= interval * 60 {
            errors.push(ValidationError {
                field: "timing.driver_timeout_secs".to_string(),
                message: format!(
                    "timeout {}s must be shorter than the {}-minute cycle",
                    self.driver_timeout_secs, interval
                ),
            });
        }

        errors
    }

    /// Cache time-to-live.
    pub fn cache_ttl(&self) -> time::Duration {
        minutes(self.cache_ttl_minutes)
    }

    /// History window the controller reads.
    pub fn history(&self) -> time::Duration {
        minutes(self.history_minutes)
    }

    /// Resampling bucket width.
    pub fn resample_interval(&self) -> time::Duration {
        minutes(self.resample_interval_minutes)
    }

    /// Control cycle period.
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.resample_interval_minutes.saturating_mul(60))
    }

    /// Driver call timeout.
    pub fn driver_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.driver_timeout_secs)
    }
}

/// Saturating conversion; unvalidated values must not panic.
fn minutes(value: u64) -> time::Duration {
    let secs = i64::try_from(value.saturating_mul(60)).unwrap_or(i64::MAX);
    time::Duration::seconds(secs)
}

/// Configuration for a zone to control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone identifier as the driver knows it.
    pub id: String,
    /// Friendly name used in logs.
    #[serde(default)]
    pub alias: Option<String>,
    /// Awake target for this zone, overriding `targets.T_target`.
    #[serde(default)]
    pub target: Option<f64>,
    /// Pin the zone to a mode instead of following the sleep schedule.
    #[serde(default)]
    pub mode: Option<TargetMode>,
}

impl ZoneConfig {
    /// Validate zone configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = self.zone_id() {
            errors.push(ValidationError {
                field: format!("{}.id", prefix),
                message: e.to_string(),
            });
        }

        if let Some(alias) = &self.alias
            && alias.is_empty()
        {
            errors.push(ValidationError {
                field: format!("{}.alias", prefix),
                message: "alias cannot be empty string (omit it instead)".to_string(),
            });
        }

        if let Some(target) = self.target
            && !(MIN_TARGET..=MAX_TARGET).contains(&target)
        {
            errors.push(ValidationError {
                field: format!("{}.target", prefix),
                message: format!(
                    "{} is outside the plausible range {}-{}°C",
                    target, MIN_TARGET, MAX_TARGET
                ),
            });
        }

        errors
    }

    /// The zone identifier.
    pub fn zone_id(&self) -> Result<ZoneId, ParseError> {
        ZoneId::new(self.id.trim())
    }

    /// The zone identifier, reported as a validation error against
    /// `zones[index]`.
    pub fn resolve(&self, index: usize) -> Result<ZoneId, ConfigError> {
        self.zone_id().map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: format!("zones[{}].id", index),
                message: e.to_string(),
            }])
        })
    }

    /// Name to show in logs.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `timing.cache_ttl_minutes` or `zones[0].id`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airtouch")
        .join("controller.toml")
}
