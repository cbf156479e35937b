//! Fixed-interval resampling of ordered samples.
//!
//! [`Resample`] groups consecutive samples into buckets `[t, t + interval)`
//! whose start `t` is a whole multiple of the interval since the Unix epoch,
//! and yields the mean of each bucket. A bucket nobody sampled into yields
//! nothing; gaps stay gaps. With a [`floor`](Resample::floor), a leading
//! bucket that starts before the floor is stamped at the floor instead.
//!
//! The adapter is lazy and works over any iterator of samples (owned or
//! borrowed). Cloning it gives an independent iterator starting from the
//! same position.

use std::borrow::Borrow;
use std::iter::Peekable;

use time::{Duration, OffsetDateTime, UtcOffset};

use airtouch_types::{ResampledPoint, Sample};

use crate::error::{Error, Result};

/// Iterator adapter averaging samples into epoch-aligned buckets.
///
/// The input must be ordered by timestamp; the sample store guarantees this
/// for everything it returns.
///
/// # Example
///
/// ```
/// use airtouch_store::Resample;
/// use airtouch_types::{Sample, ZoneId};
/// use time::{Duration, OffsetDateTime};
///
/// let zone = ZoneId::new("den").unwrap();
/// let t0 = OffsetDateTime::UNIX_EPOCH;
/// let samples = vec![
///     Sample::new(zone.clone(), t0, 20.0, 0.2, true),
///     Sample::new(zone.clone(), t0 + Duration::minutes(2), 22.0, 0.4, true),
///     Sample::new(zone.clone(), t0 + Duration::minutes(7), 23.0, 0.5, true),
/// ];
///
/// let points: Vec<_> = Resample::new(samples.iter(), Duration::minutes(5))?.collect();
/// assert_eq!(points.len(), 2);
/// assert_eq!(points[0].mean_temperature, 21.0);
/// assert_eq!(points[1].timestamp, t0 + Duration::minutes(5));
/// # Ok::<(), airtouch_store::Error>(())
/// ```
pub struct Resample<I: Iterator> {
    inner: Peekable<I>,
    interval_secs: i64,
    floor: Option<OffsetDateTime>,
}

impl<I> Clone for Resample<I>
where
    I: Iterator + Clone,
    I::Item: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            interval_secs: self.interval_secs,
            floor: self.floor,
        }
    }
}

impl<I: Iterator> std::fmt::Debug for Resample<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resample")
            .field("interval_secs", &self.interval_secs)
            .field("floor", &self.floor)
            .finish_non_exhaustive()
    }
}

fn sample_of<T: Borrow<Sample>>(item: &T) -> &Sample {
    item.borrow()
}

impl<I> Resample<I>
where
    I: Iterator,
    I::Item: Borrow<Sample>,
{
    /// Wrap `samples`, bucketing by `interval`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInterval`] if `interval` is shorter than one second.
    pub fn new(samples: I, interval: Duration) -> Result<Self> {
        let interval_secs = interval.whole_seconds();
        if interval_secs < 1 {
            return Err(Error::InvalidInterval(interval));
        }
        Ok(Self {
            inner: samples.peekable(),
            interval_secs,
            floor: None,
        })
    }

    /// Never stamp a point earlier than `floor`.
    ///
    /// Used when the input is a time window whose start is not aligned to
    /// the interval, so the first partial bucket stays inside the window.
    #[must_use]
    pub fn floor(mut self, floor: OffsetDateTime) -> Self {
        self.floor = Some(floor);
        self
    }

    fn bucket_of(&self, timestamp: OffsetDateTime) -> i64 {
        timestamp.unix_timestamp().div_euclid(self.interval_secs)
    }

    fn bucket_start(&self, timestamp: OffsetDateTime) -> OffsetDateTime {
        let utc = timestamp.to_offset(UtcOffset::UTC);
        let into_bucket = utc.unix_timestamp().rem_euclid(self.interval_secs);
        utc - Duration::new(into_bucket, utc.nanosecond() as i32)
    }
}

impl<I> Iterator for Resample<I>
where
    I: Iterator,
    I::Item: Borrow<Sample>,
{
    type Item = ResampledPoint;

    fn next(&mut self) -> Option<ResampledPoint> {
        let item = self.inner.next()?;
        let first = sample_of(&item);
        let bucket = self.bucket_of(first.timestamp);
        let mut timestamp = self.bucket_start(first.timestamp);
        if let Some(floor) = self.floor
            && timestamp < floor
        {
            timestamp = floor;
        }

        let mut temperature = first.measured_temperature;
        let mut airflow = first.airflow_fraction;
        let mut count = 1usize;

        let interval_secs = self.interval_secs;
        while let Some(sample) = self.inner.next_if(|s| {
            sample_of(s).timestamp.unix_timestamp().div_euclid(interval_secs) == bucket
        }) {
            let sample = sample_of(&sample);
            temperature += sample.measured_temperature;
            airflow += sample.airflow_fraction;
            count += 1;
        }

        Some(ResampledPoint {
            timestamp,
            mean_temperature: temperature / count as f64,
            mean_airflow_fraction: airflow / count as f64,
            sample_count: count,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.inner.size_hint();
        (lower.min(1), upper)
    }
}

impl<I> std::iter::FusedIterator for Resample<I>
where
    I: std::iter::FusedIterator,
    I::Item: Borrow<Sample>,
{
}
