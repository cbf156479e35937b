//! In-memory AC driver for testing and simulation.
//!
//! The [`MockDriver`] implements the [`AcDriver`] trait, allowing it to be
//! used interchangeably with a real controller connection in generic code.
//!
//! # Features
//!
//! - **Failure injection**: make `sense`, `read` or `write` fail for one zone,
//!   permanently or for the next N calls
//! - **Latency simulation**: add an artificial delay to every driver call
//! - **Thermal response**: optionally move each zone's temperature toward
//!   its setpoint when a command is applied, which is what the
//!   `--simulate` run mode uses to close the loop without hardware

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use airtouch_types::{AcMode, Command, DeviceState, ZoneId, ZoneTelemetry};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{AcDriver, Ack};

/// Driver operation a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// [`AcDriver::sense`].
    Sense,
    /// [`AcDriver::read`].
    Read,
    /// [`AcDriver::write`].
    Write,
}

impl std::fmt::Display for MockOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockOp::Sense => write!(f, "sense"),
            MockOp::Read => write!(f, "read"),
            MockOp::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Always(String),
    Transient(u32),
}

/// Simulated state of one zone.
#[derive(Debug, Clone)]
pub struct MockZone {
    temperature: f64,
    state: DeviceState,
}

impl MockZone {
    /// A cooling zone at 24°C with the damper at 20% and the unit set to 22°C.
    pub fn new(zone: ZoneId) -> Self {
        Self {
            temperature: 24.0,
            state: DeviceState {
                zone,
                set_temperature: 22.0,
                airflow_fraction: 0.2,
                power_on: true,
                ac_mode: AcMode::Cool,
                setpoint_min: 16.0,
                setpoint_max: 30.0,
                last_refreshed: OffsetDateTime::UNIX_EPOCH,
            },
        }
    }

    /// Set the measured zone temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the current damper opening.
    #[must_use]
    pub fn airflow(mut self, airflow: f64) -> Self {
        self.state.airflow_fraction = airflow;
        self
    }

    /// Set the AC unit setpoint.
    #[must_use]
    pub fn setpoint(mut self, setpoint: f64) -> Self {
        self.state.set_temperature = setpoint;
        self
    }

    /// Set the AC mode.
    #[must_use]
    pub fn ac_mode(mut self, mode: AcMode) -> Self {
        self.state.ac_mode = mode;
        self
    }

    /// Set whether the AC unit is powered on.
    #[must_use]
    pub fn power_on(mut self, on: bool) -> Self {
        self.state.power_on = on;
        self
    }

    /// Set the setpoint range the unit accepts.
    #[must_use]
    pub fn setpoint_range(mut self, min: f64, max: f64) -> Self {
        self.state.setpoint_min = min;
        self.state.setpoint_max = max;
        self
    }

    fn telemetry(&self, noise: f64) -> ZoneTelemetry {
        let airflow = self.state.airflow_fraction;
        ZoneTelemetry {
            temperature: self.temperature + noise,
            airflow_fraction: airflow,
            power_on: self.state.power_on && airflow > 0.0,
            captured_at: None,
        }
    }

    /// Move the temperature toward the setpoint in proportion to airflow.
    fn respond(&mut self, degrees_at_full_airflow: f64) {
        let airflow = self.state.airflow_fraction;
        if !self.state.power_on || airflow <= 0.0 {
            return;
        }
        let gap = self.state.set_temperature - self.temperature;
        let conditioning = match self.state.ac_mode {
            AcMode::Cool => gap < 0.0,
            AcMode::Heat => gap > 0.0,
            AcMode::Auto => true,
            AcMode::Fan | AcMode::Dry => false,
        };
        if conditioning {
            let step = (degrees_at_full_airflow * airflow).min(gap.abs());
            self.temperature += step * gap.signum();
        }
    }
}

/// A mock AirTouch controller for testing.
///
/// Implements [`AcDriver`] trait for use in generic code and testing.
///
/// # Example
///
/// ```
/// use airtouch_core::{AcDriver, MockDriver, MockZone};
/// use airtouch_types::ZoneId;
///
/// #[tokio::main]
/// async fn main() {
///     let zone = ZoneId::new("study").unwrap();
///     let driver = MockDriver::builder()
///         .zone(MockZone::new(zone.clone()).temperature(26.5))
///         .build();
///
///     let telemetry = driver.sense(&zone).await.unwrap();
///     assert_eq!(telemetry.temperature, 26.5);
/// }
/// ```
pub struct MockDriver {
    name: String,
    zones: RwLock<HashMap<ZoneId, MockZone>>,
    failures: RwLock<HashMap<(ZoneId, MockOp), Failure>>,
    writes: RwLock<Vec<Command>>,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    sense_count: AtomicU32,
    read_count: AtomicU32,
    write_count: AtomicU32,
    thermal_response: f64,
    noise: f64,
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("name", &self.name)
            .field("write_count", &self.write_count.load(Ordering::Relaxed))
            .field("thermal_response", &self.thermal_response)
            .finish()
    }
}

impl MockDriver {
    /// Create an empty mock driver with no zones.
    pub fn new(name: &str) -> Self {
        MockDriverBuilder::new().name(name).build()
    }

    /// Start building a mock driver.
    #[must_use]
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::new()
    }

    async fn before(&self, zone: &ZoneId, op: MockOp) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let mut failures = self.failures.write().await;
        let key = (zone.clone(), op);
        let message = match failures.get_mut(&key) {
            None => return Ok(()),
            Some(Failure::Always(message)) => message.clone(),
            Some(Failure::Transient(remaining)) => {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    failures.remove(&key);
                }
                format!("transient {} failure", op)
            }
        };

        Err(match op {
            MockOp::Write => Error::write_failed(zone, message),
            MockOp::Sense | MockOp::Read => {
                Error::connection_failed(None, ConnectionFailureReason::Other(message))
            }
        })
    }

    // --- Test control methods ---

    /// Set a zone's measured temperature.
    pub async fn set_temperature(&self, zone: &ZoneId, temperature: f64) {
        if let Some(z) = self.zones.write().await.get_mut(zone) {
            z.temperature = temperature;
        }
    }

    /// Set the AC mode reported for a zone.
    pub async fn set_ac_mode(&self, zone: &ZoneId, mode: AcMode) {
        if let Some(z) = self.zones.write().await.get_mut(zone) {
            z.state.ac_mode = mode;
        }
    }

    /// Make every `op` on `zone` fail with `message`.
    pub async fn fail(&self, zone: &ZoneId, op: MockOp, message: &str) {
        self.failures
            .write()
            .await
            .insert((zone.clone(), op), Failure::Always(message.to_string()));
    }

    /// Make the next `count` calls of `op` on `zone` fail.
    pub async fn fail_transient(&self, zone: &ZoneId, op: MockOp, count: u32) {
        if count > 0 {
            self.failures
                .write()
                .await
                .insert((zone.clone(), op), Failure::Transient(count));
        }
    }

    /// Remove every injected failure.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Set simulated latency for every driver call.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Current simulated temperature of a zone.
    pub async fn temperature(&self, zone: &ZoneId) -> Option<f64> {
        self.zones.read().await.get(zone).map(|z| z.temperature)
    }

    /// Current simulated device state of a zone.
    pub async fn zone_state(&self, zone: &ZoneId) -> Option<DeviceState> {
        self.zones.read().await.get(zone).map(|z| z.state.clone())
    }

    /// Every command accepted so far, in order.
    pub async fn writes(&self) -> Vec<Command> {
        self.writes.read().await.clone()
    }

    /// Number of `sense` calls that reached the driver.
    pub fn sense_count(&self) -> u32 {
        self.sense_count.load(Ordering::Relaxed)
    }

    /// Number of `read` calls that reached the driver.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Number of `write` calls that reached the driver.
    pub fn write_count(&self) -> u32 {
        self.write_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AcDriver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sense(&self, zone: &ZoneId) -> Result<ZoneTelemetry> {
        self.sense_count.fetch_add(1, Ordering::Relaxed);
        self.before(zone, MockOp::Sense).await?;

        let noise = if self.noise > 0.0 {
            rand::random_range(-self.noise..=self.noise)
        } else {
            0.0
        };

        self.zones
            .read()
            .await
            .get(zone)
            .map(|z| z.telemetry(noise))
            .ok_or_else(|| Error::ZoneNotFound(zone.clone()))
    }

    async fn read(&self, zone: &ZoneId) -> Result<DeviceState> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.before(zone, MockOp::Read).await?;

        let zones = self.zones.read().await;
        let z = zones
            .get(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.clone()))?;
        Ok(DeviceState {
            last_refreshed: OffsetDateTime::now_utc(),
            ..z.state.clone()
        })
    }

    async fn write(&self, zone: &ZoneId, command: &Command) -> Result<Ack> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.before(zone, MockOp::Write).await?;

        let mut zones = self.zones.write().await;
        let z = zones
            .get_mut(zone)
            .ok_or_else(|| Error::ZoneNotFound(zone.clone()))?;

        if !z.state.accepts_setpoint(command.new_set_temperature) {
            return Err(Error::write_failed(
                zone,
                format!("setpoint {} outside unit range", command.new_set_temperature),
            ));
        }
        if !(0.0..=1.0).contains(&command.new_airflow_fraction) {
            return Err(Error::write_failed(
                zone,
                format!("airflow {} outside 0-1", command.new_airflow_fraction),
            ));
        }

        z.state = z.state.with_command(command);
        if self.thermal_response > 0.0 {
            z.respond(self.thermal_response);
        }
        drop(zones);

        self.writes.write().await.push(command.clone());
        Ok(Ack)
    }
}

/// Builder for creating mock drivers with custom settings.
#[derive(Debug)]
pub struct MockDriverBuilder {
    name: String,
    zones: Vec<MockZone>,
    latency: Duration,
    thermal_response: f64,
    noise: f64,
}

impl Default for MockDriverBuilder {
    fn default() -> Self {
        Self {
            name: "Mock AirTouch".to_string(),
            zones: Vec::new(),
            latency: Duration::ZERO,
            thermal_response: 0.0,
            noise: 0.0,
        }
    }
}

impl MockDriverBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the driver name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add a zone.
    #[must_use]
    pub fn zone(mut self, zone: MockZone) -> Self {
        self.zones.push(zone);
        self
    }

    /// Delay every driver call by `latency`.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Degrees the zone moves toward the setpoint per accepted command at
    /// full airflow (0 disables the thermal model).
    #[must_use]
    pub fn thermal_response(mut self, degrees: f64) -> Self {
        self.thermal_response = degrees;
        self
    }

    /// Uniform noise amplitude added to sensed temperatures.
    #[must_use]
    pub fn noise(mut self, amplitude: f64) -> Self {
        self.noise = amplitude;
        self
    }

    /// Build the mock driver.
    #[must_use]
    pub fn build(self) -> MockDriver {
        let zones = self
            .zones
            .into_iter()
            .map(|z| (z.state.zone.clone(), z))
            .collect();

        MockDriver {
            name: self.name,
            zones: RwLock::new(zones),
            failures: RwLock::new(HashMap::new()),
            writes: RwLock::new(Vec::new()),
            latency_ms: AtomicU64::new(self.latency.as_millis() as u64),
            sense_count: AtomicU32::new(0),
            read_count: AtomicU32::new(0),
            write_count: AtomicU32::new(0),
            thermal_response: self.thermal_response,
            noise: self.noise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: &str) -> ZoneId {
        ZoneId::new(id).unwrap()
    }

    fn command(id: &str, airflow: f64, setpoint: f64) -> Command {
        Command {
            zone: zone(id),
            new_airflow_fraction: airflow,
            new_set_temperature: setpoint,
        }
    }

    #[tokio::test]
    async fn test_mock_driver_sense_and_read() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")).temperature(25.5).airflow(0.4))
            .build();

        let telemetry = driver.sense(&zone("a")).await.unwrap();
        assert_eq!(telemetry.temperature, 25.5);
        assert_eq!(telemetry.airflow_fraction, 0.4);
        assert!(telemetry.power_on);

        let state = driver.read(&zone("a")).await.unwrap();
        assert_eq!(state.ac_mode, AcMode::Cool);
        assert_eq!(state.set_temperature, 22.0);
        assert!(state.last_refreshed > OffsetDateTime::UNIX_EPOCH);

        assert_eq!(driver.sense_count(), 1);
        assert_eq!(driver.read_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_driver_unknown_zone() {
        let driver = MockDriver::new("empty");
        let err = driver.read(&zone("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::ZoneNotFound(_)));
    }

    #[tokio::test]
    async fn test_mock_driver_write_applies_command() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")))
            .build();

        driver.write(&zone("a"), &command("a", 0.6, 21.0)).await.unwrap();

        let state = driver.zone_state(&zone("a")).await.unwrap();
        assert_eq!(state.airflow_fraction, 0.6);
        assert_eq!(state.set_temperature, 21.0);
        assert_eq!(driver.writes().await.len(), 1);
        assert_eq!(driver.write_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_driver_rejects_out_of_range_setpoint() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")).setpoint_range(18.0, 28.0))
            .build();

        let err = driver
            .write(&zone("a"), &command("a", 0.5, 30.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WriteFailed { .. }));
        assert!(driver.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_driver_permanent_failure_is_zone_local() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")))
            .zone(MockZone::new(zone("b")))
            .build();
        driver.fail(&zone("a"), MockOp::Write, "rejected").await;

        let err = driver
            .write(&zone("a"), &command("a", 0.5, 22.0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rejected"));
        assert!(driver.write(&zone("a"), &command("a", 0.5, 22.0)).await.is_err());
        assert!(driver.write(&zone("b"), &command("b", 0.5, 22.0)).await.is_ok());
        assert!(driver.read(&zone("a")).await.is_ok());

        driver.clear_failures().await;
        assert!(driver.write(&zone("a"), &command("a", 0.5, 22.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_driver_transient_failures() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")))
            .build();
        driver.fail_transient(&zone("a"), MockOp::Sense, 2).await;

        // First two reads should fail
        assert!(driver.sense(&zone("a")).await.is_err());
        assert!(driver.sense(&zone("a")).await.is_err());

        // Third read should succeed
        assert!(driver.sense(&zone("a")).await.is_ok());
        assert_eq!(driver.sense_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_driver_latency() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")))
            .latency(Duration::from_millis(500))
            .build();

        let start = tokio::time::Instant::now();
        driver.sense(&zone("a")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));

        driver.set_latency(Duration::ZERO);
        let start = tokio::time::Instant::now();
        driver.sense(&zone("a")).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_mock_driver_thermal_response() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")).temperature(26.0))
            .thermal_response(1.0)
            .build();

        driver.write(&zone("a"), &command("a", 0.5, 22.0)).await.unwrap();
        assert_eq!(driver.temperature(&zone("a")).await, Some(25.5));

        // Zone off: no conditioning.
        driver.write(&zone("a"), &command("a", 0.0, 22.0)).await.unwrap();
        assert_eq!(driver.temperature(&zone("a")).await, Some(25.5));
        let telemetry = driver.sense(&zone("a")).await.unwrap();
        assert!(!telemetry.power_on);
    }

    #[tokio::test]
    async fn test_mock_driver_fan_mode_does_not_condition() {
        let driver = MockDriver::builder()
            .zone(MockZone::new(zone("a")).temperature(26.0))
            .thermal_response(1.0)
            .build();
        driver.set_ac_mode(&zone("a"), AcMode::Fan).await;

        driver.write(&zone("a"), &command("a", 1.0, 22.0)).await.unwrap();
        assert_eq!(driver.temperature(&zone("a")).await, Some(26.0));
    }

    #[tokio::test]
    async fn test_driver_trait_through_arc() {
        use std::sync::Arc;

        async fn temperature_via_trait<D: AcDriver>(d: &D, zone: &ZoneId) -> f64 {
            d.sense(zone).await.unwrap().temperature
        }

        let driver = Arc::new(
            MockDriver::builder()
                .zone(MockZone::new(zone("a")).temperature(21.0))
                .build(),
        );
        assert_eq!(temperature_via_trait(&driver, &zone("a")).await, 21.0);
        assert_eq!(driver.name(), "Mock AirTouch");
    }

    #[test]
    fn test_mock_driver_debug() {
        let driver = MockDriver::new("debug");
        let debug = format!("{:?}", driver);
        assert!(debug.contains("MockDriver"));
        assert!(debug.contains("debug"));
    }
}
