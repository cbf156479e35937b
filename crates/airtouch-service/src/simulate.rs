//! In-memory plant for running the controller without hardware.

use std::time::Duration;

use airtouch_core::{MockDriver, MockZone};
use airtouch_types::AcMode;

use crate::config::{Config, ConfigError};

/// Degrees a simulated zone moves per accepted command at full airflow.
pub const SIMULATED_THERMAL_RESPONSE: f64 = 0.5;
/// Amplitude of simulated sensor noise.
pub const SIMULATED_NOISE: f64 = 0.05;
/// How far above its target each simulated zone starts.
pub const SIMULATED_START_OFFSET: f64 = 3.0;

/// Build a [`MockDriver`] with one cooling zone per configured zone.
///
/// Every zone starts [`SIMULATED_START_OFFSET`] degrees above its target with
/// a small airflow, so the first cycles show the controller ramping up.
pub fn simulated_driver(config: &Config) -> Result<MockDriver, ConfigError> {
    let mut builder = MockDriver::builder()
        .name("Simulated AirTouch")
        .thermal_response(SIMULATED_THERMAL_RESPONSE)
        .noise(SIMULATED_NOISE)
        .latency(Duration::from_millis(50));

    for (i, zone) in config.zones.iter().enumerate() {
        let target = zone.target.unwrap_or(config.targets.t_target);
        builder = builder.zone(
            MockZone::new(zone.resolve(i)?)
                .temperature(target + SIMULATED_START_OFFSET)
                .setpoint(target)
                .airflow(0.1)
                .ac_mode(AcMode::Cool),
        );
    }

    Ok(builder.build())
}
