//! Trait abstractions for AC controller access.
//!
//! This module provides the [`AcDriver`] trait that abstracts over the
//! vendor transport to an AirTouch controller and the mock driver used for
//! testing and simulation.

use std::sync::Arc;

use async_trait::async_trait;

use airtouch_types::{Command, DeviceState, ZoneId, ZoneTelemetry};

use crate::error::Result;

/// Acknowledgement that the controller accepted a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack;

/// Trait abstracting access to an AC controller.
///
/// Implementations own the transport; the control loop only sees zones.
/// Every error is treated as transient and local to the zone involved.
///
/// # Example
///
/// ```ignore
/// use airtouch_core::{AcDriver, Result};
/// use airtouch_types::ZoneId;
///
/// async fn print_temperature<D: AcDriver>(driver: &D, zone: &ZoneId) -> Result<()> {
///     let telemetry = driver.sense(zone).await?;
///     println!("{}: {:.1}°C", zone, telemetry.temperature);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait AcDriver: Send + Sync {
    /// Human-readable driver name, used in logs.
    fn name(&self) -> &str;

    /// Read the zone's current temperature and damper telemetry.
    async fn sense(&self, zone: &ZoneId) -> Result<ZoneTelemetry>;

    /// Read the zone's configuration (setpoint, airflow, mode, limits).
    async fn read(&self, zone: &ZoneId) -> Result<DeviceState>;

    /// Apply a command to the zone.
    async fn write(&self, zone: &ZoneId, command: &Command) -> Result<Ack>;
}

#[async_trait]
impl<T: AcDriver + ?Sized> AcDriver for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn sense(&self, zone: &ZoneId) -> Result<ZoneTelemetry> {
        (**self).sense(zone).await
    }

    async fn read(&self, zone: &ZoneId) -> Result<DeviceState> {
        (**self).read(zone).await
    }

    async fn write(&self, zone: &ZoneId, command: &Command) -> Result<Ack> {
        (**self).write(zone, command).await
    }
}
