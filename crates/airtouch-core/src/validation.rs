//! Plausibility checks for zone telemetry and device state.
//!
//! AirTouch controllers occasionally report garbage for a zone whose sensor
//! is disconnected or whose battery is flat (a temperature of 0 or 255, an
//! opening above 100%). Readings that fail validation are rejected before
//! they reach the sample store, so one bad frame cannot drag the resampled
//! mean around.
//!
//! # Example
//!
//! ```
//! use airtouch_core::TelemetryValidator;
//! use airtouch_types::{DeviceState, ZoneTelemetry};
//!
//! let validator = TelemetryValidator::default();
//! let telemetry = ZoneTelemetry {
//!     temperature: 23.4,
//!     airflow_fraction: 0.35,
//!     power_on: true,
//!     captured_at: None,
//! };
//!
//! let result = validator.validate(&telemetry);
//! assert!(result.is_valid);
//! assert!(!result.has_warnings());
//! ```

use serde::{Deserialize, Serialize};

use airtouch_types::{DeviceState, ZoneTelemetry};

/// Warning types for validation issues.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new warning types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ValidationWarning {
    /// Temperature is NaN or infinite.
    TemperatureNotFinite,
    /// Temperature is below minimum expected value.
    TemperatureTooLow { value: f64, min: f64 },
    /// Temperature is above maximum expected value.
    TemperatureTooHigh { value: f64, max: f64 },
    /// Airflow fraction is outside 0.0 - 1.0 (or not a number).
    AirflowOutOfRange { value: f64 },
    /// Zone reports an open damper while powered off.
    AirflowWhileOff { value: f64 },
    /// Device setpoint is NaN or infinite.
    SetpointNotFinite,
    /// Advertised setpoint range is empty or not a number.
    SetpointRangeInvalid { min: f64, max: f64 },
}

impl ValidationWarning {
    /// Whether this warning makes the reading unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ValidationWarning::AirflowWhileOff { .. })
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::TemperatureNotFinite => {
                write!(f, "Temperature is not a finite number")
            }
            ValidationWarning::TemperatureTooLow { value, min } => {
                write!(f, "Temperature {}°C is below minimum {}°C", value, min)
            }
            ValidationWarning::TemperatureTooHigh { value, max } => {
                write!(f, "Temperature {}°C exceeds maximum {}°C", value, max)
            }
            ValidationWarning::AirflowOutOfRange { value } => {
                write!(f, "Airflow {} is out of valid range (0-1)", value)
            }
            ValidationWarning::AirflowWhileOff { value } => {
                write!(f, "Airflow {} reported while zone is off", value)
            }
            ValidationWarning::SetpointNotFinite => {
                write!(f, "Setpoint is not a finite number")
            }
            ValidationWarning::SetpointRangeInvalid { min, max } => {
                write!(f, "Setpoint range {}..{} is invalid", min, max)
            }
        }
    }
}

/// Result of validating a reading.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the reading passed validation.
    pub is_valid: bool,
    /// List of warnings (may be non-empty even if valid).
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Build a result from collected warnings; any fatal one invalidates it.
    pub fn from_warnings(warnings: Vec<ValidationWarning>) -> Self {
        Self {
            is_valid: !warnings.iter().any(ValidationWarning::is_fatal),
            warnings,
        }
    }

    /// Check if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings joined into one human-readable line.
    pub fn summary(&self) -> String {
        self.warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Configuration for telemetry validation.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Minimum plausible indoor temperature (°C).
    pub temperature_min: f64,
    /// Maximum plausible indoor temperature (°C).
    pub temperature_max: f64,
    /// Flag an open damper on a powered-off zone.
    pub warn_on_airflow_while_off: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            temperature_min: -20.0,
            temperature_max: 60.0,
            warn_on_airflow_while_off: true,
        }
    }
}

impl ValidatorConfig {
    /// Create new validator config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set temperature range (min, max).
    #[must_use]
    pub fn temperature_range(mut self, min: f64, max: f64) -> Self {
        self.temperature_min = min;
        self.temperature_max = max;
        self
    }

    /// Set whether to warn on airflow reported for a powered-off zone.
    #[must_use]
    pub fn warn_on_airflow_while_off(mut self, warn: bool) -> Self {
        self.warn_on_airflow_while_off = warn;
        self
    }
}

/// Validator for zone telemetry.
#[derive(Debug, Clone, Default)]
pub struct TelemetryValidator {
    config: ValidatorConfig,
}

impl TelemetryValidator {
    /// Create a new validator with the given configuration.
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate one telemetry reading.
    pub fn validate(&self, telemetry: &ZoneTelemetry) -> ValidationResult {
        let mut warnings = Vec::new();
        let t = telemetry.temperature;

        if !t.is_finite() {
            warnings.push(ValidationWarning::TemperatureNotFinite);
        } else if t < self.config.temperature_min {
            warnings.push(ValidationWarning::TemperatureTooLow {
                value: t,
                min: self.config.temperature_min,
            });
        } else if t > self.config.temperature_max {
            warnings.push(ValidationWarning::TemperatureTooHigh {
                value: t,
                max: self.config.temperature_max,
            });
        }

        let airflow = telemetry.airflow_fraction;
        if !(0.0..=1.0).contains(&airflow) {
            warnings.push(ValidationWarning::AirflowOutOfRange { value: airflow });
        } else if self.config.warn_on_airflow_while_off && !telemetry.power_on && airflow > 0.0 {
            warnings.push(ValidationWarning::AirflowWhileOff { value: airflow });
        }

        ValidationResult::from_warnings(warnings)
    }

    /// Validate a device state read back from the controller.
    ///
    /// Only values the controller could not legitimately report are
    /// rejected; a setpoint outside the advertised range is left for the
    /// controller to clamp.
    pub fn validate_state(&self, state: &DeviceState) -> ValidationResult {
        let mut warnings = Vec::new();

        if !state.set_temperature.is_finite() {
            warnings.push(ValidationWarning::SetpointNotFinite);
        }
        let (min, max) = (state.setpoint_min, state.setpoint_max);
        if !(min.is_finite() && max.is_finite() && min <= max) {
            warnings.push(ValidationWarning::SetpointRangeInvalid { min, max });
        }
        if !(0.0..=1.0).contains(&state.airflow_fraction) {
            warnings.push(ValidationWarning::AirflowOutOfRange {
                value: state.airflow_fraction,
            });
        }

        ValidationResult::from_warnings(warnings)
    }
}
