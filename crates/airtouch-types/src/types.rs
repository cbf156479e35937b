//! Core types for AirTouch zone control.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Stable identifier for one independently controllable zone.
///
/// On AirTouch hardware a zone is a "group" (a damper-controlled room or set
/// of rooms) that belongs to one AC unit. The identifier is opaque to the
/// control core; it only needs to be stable and non-empty.
///
/// ```
/// use airtouch_types::ZoneId;
///
/// let zone: ZoneId = "living".parse().unwrap();
/// assert_eq!(zone.as_str(), "living");
/// assert!(ZoneId::new("  ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct ZoneId(String);

impl ZoneId {
    /// Create a zone identifier, rejecting blank strings.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ParseError::EmptyZoneId);
        }
        Ok(Self(id))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ZoneId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ZoneId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ZoneId> for String {
    fn from(zone: ZoneId) -> Self {
        zone.0
    }
}

impl AsRef<str> for ZoneId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Operating mode of the AC unit a zone belongs to.
///
/// The numeric codes match the mode field reported by AirTouch controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum AcMode {
    /// The unit chooses between heating and cooling itself.
    #[default]
    Auto = 0,
    /// Cooling.
    Cool = 1,
    /// Dehumidifying.
    Dry = 2,
    /// Fan only, no conditioning.
    Fan = 3,
    /// Heating.
    Heat = 4,
}

impl AcMode {
    /// Whether this mode can bring a zone's temperature down.
    #[must_use]
    pub fn can_cool(&self) -> bool {
        matches!(self, AcMode::Cool | AcMode::Auto)
    }

    /// Whether this mode can bring a zone's temperature up.
    #[must_use]
    pub fn can_heat(&self) -> bool {
        matches!(self, AcMode::Heat | AcMode::Auto)
    }

    /// Whether the zone dampers are under temperature control in this mode.
    ///
    /// Fan and dry modes do not condition air toward a setpoint.
    #[must_use]
    pub fn is_conditioning(&self) -> bool {
        self.can_cool() || self.can_heat()
    }
}

impl TryFrom<u8> for AcMode {
    type Error = ParseError;

    /// Convert a controller mode code to an `AcMode`.
    ///
    /// ```
    /// use airtouch_types::AcMode;
    ///
    /// assert_eq!(AcMode::try_from(1), Ok(AcMode::Cool));
    /// assert_eq!(AcMode::try_from(4), Ok(AcMode::Heat));
    /// assert!(AcMode::try_from(9).is_err());
    /// ```
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AcMode::Auto),
            1 => Ok(AcMode::Cool),
            2 => Ok(AcMode::Dry),
            3 => Ok(AcMode::Fan),
            4 => Ok(AcMode::Heat),
            _ => Err(ParseError::UnknownAcModeCode(value)),
        }
    }
}

impl FromStr for AcMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(AcMode::Auto),
            "cool" => Ok(AcMode::Cool),
            "dry" => Ok(AcMode::Dry),
            "fan" => Ok(AcMode::Fan),
            "heat" => Ok(AcMode::Heat),
            _ => Err(ParseError::UnknownAcMode(s.to_string())),
        }
    }
}

impl fmt::Display for AcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcMode::Auto => write!(f, "Auto"),
            AcMode::Cool => write!(f, "Cool"),
            AcMode::Dry => write!(f, "Dry"),
            AcMode::Fan => write!(f, "Fan"),
            AcMode::Heat => write!(f, "Heat"),
        }
    }
}

/// Comfort mode requested for a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TargetMode {
    /// Normal daytime target.
    #[default]
    Awake,
    /// Overnight target (substitutes the sleep temperature).
    Sleep,
    /// The zone should be powered down.
    Off,
}

impl FromStr for TargetMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "awake" => Ok(TargetMode::Awake),
            "sleep" => Ok(TargetMode::Sleep),
            "off" => Ok(TargetMode::Off),
            _ => Err(ParseError::UnknownTargetMode(s.to_string())),
        }
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMode::Awake => write!(f, "awake"),
            TargetMode::Sleep => write!(f, "sleep"),
            TargetMode::Off => write!(f, "off"),
        }
    }
}

/// One recorded observation of a zone.
///
/// Samples are immutable once recorded and are owned by the sample store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// Zone the sample belongs to.
    pub zone: ZoneId,
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Measured zone temperature in degrees Celsius.
    pub measured_temperature: f64,
    /// Damper opening at the time of the sample (0.0 - 1.0).
    pub airflow_fraction: f64,
    /// Whether the zone was powered on.
    pub power_on: bool,
}

impl Sample {
    /// Create a new sample.
    pub fn new(
        zone: ZoneId,
        timestamp: OffsetDateTime,
        measured_temperature: f64,
        airflow_fraction: f64,
        power_on: bool,
    ) -> Self {
        Self {
            zone,
            timestamp,
            measured_temperature,
            airflow_fraction,
            power_on,
        }
    }
}

/// Mean of all samples falling into one resampling bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResampledPoint {
    /// Bucket start, aligned to a multiple of the interval since the epoch.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Mean measured temperature in the bucket.
    pub mean_temperature: f64,
    /// Mean airflow fraction in the bucket.
    pub mean_airflow_fraction: f64,
    /// Number of samples that contributed (always at least one).
    pub sample_count: usize,
}

/// Last-known configuration of a zone and its AC unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceState {
    /// Zone this state describes.
    pub zone: ZoneId,
    /// Current setpoint of the AC unit in degrees Celsius.
    pub set_temperature: f64,
    /// Current damper opening (0.0 - 1.0).
    pub airflow_fraction: f64,
    /// Whether the AC unit is powered on.
    pub power_on: bool,
    /// Operating mode of the AC unit.
    pub ac_mode: AcMode,
    /// Lowest setpoint the unit accepts.
    pub setpoint_min: f64,
    /// Highest setpoint the unit accepts.
    pub setpoint_max: f64,
    /// When this state was last read from (or written to) the device.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_refreshed: OffsetDateTime,
}

impl DeviceState {
    /// Whether `temperature` lies within the advertised setpoint range.
    #[must_use]
    pub fn accepts_setpoint(&self, temperature: f64) -> bool {
        temperature >= self.setpoint_min && temperature <= self.setpoint_max
    }

    /// The state the device is expected to be in after `command` is applied.
    #[must_use]
    pub fn with_command(&self, command: &Command) -> Self {
        Self {
            set_temperature: command.new_set_temperature,
            airflow_fraction: command.new_airflow_fraction,
            ..self.clone()
        }
    }
}

/// Comfort target for one zone, supplied from configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControlTarget {
    /// Zone the target applies to.
    pub zone: ZoneId,
    /// Desired temperature while awake, in degrees Celsius.
    pub target_temperature: f64,
    /// Requested comfort mode.
    pub mode: TargetMode,
}

/// Output of the controller for one zone and one cycle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Command {
    /// Zone to command.
    pub zone: ZoneId,
    /// New damper opening; exactly 0.0 switches the zone off.
    pub new_airflow_fraction: f64,
    /// New setpoint for the AC unit.
    pub new_set_temperature: f64,
}

impl Command {
    /// Whether this command leaves the zone powered on.
    #[must_use]
    pub fn power_on(&self) -> bool {
        self.new_airflow_fraction > 0.0
    }

    /// Damper opening as the whole percentage AirTouch groups accept.
    ///
    /// ```
    /// use airtouch_types::{Command, ZoneId};
    ///
    /// let cmd = Command {
    ///     zone: ZoneId::new("den").unwrap(),
    ///     new_airflow_fraction: 0.35,
    ///     new_set_temperature: 22.0,
    /// };
    /// assert_eq!(cmd.airflow_percent(), 35);
    /// ```
    #[must_use]
    pub fn airflow_percent(&self) -> u8 {
        (self.new_airflow_fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Raw zone telemetry as read from the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZoneTelemetry {
    /// Measured zone temperature in degrees Celsius.
    pub temperature: f64,
    /// Damper opening reported by the zone (0.0 - 1.0).
    pub airflow_fraction: f64,
    /// Whether the zone is powered on.
    pub power_on: bool,
    /// Time the controller captured the reading, if it reports one.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub captured_at: Option<OffsetDateTime>,
}

impl ZoneTelemetry {
    /// Turn this reading into a sample, timestamping it with `now` when the
    /// controller did not supply a capture time.
    #[must_use]
    pub fn into_sample(self, zone: ZoneId, now: OffsetDateTime) -> Sample {
        Sample::new(
            zone,
            self.captured_at.unwrap_or(now),
            self.temperature,
            self.airflow_fraction,
            self.power_on,
        )
    }
}
