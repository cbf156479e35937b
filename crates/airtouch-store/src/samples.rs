//! Per-zone sample history.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, trace};

use airtouch_types::{Clock, Sample, ZoneId};

use crate::error::{Error, Result};
use crate::resample::Resample;

/// One week of one-minute samples.
pub const DEFAULT_ZONE_CAPACITY: usize = 7 * 24 * 60;

/// Retention limits for a [`SampleStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Samples older than this are evicted.
    pub history: Duration,
    /// Maximum samples kept per zone; the oldest is dropped beyond this.
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history: Duration::minutes(60),
            capacity: DEFAULT_ZONE_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Set the retention window.
    #[must_use]
    pub fn history(mut self, history: Duration) -> Self {
        self.history = history;
        self
    }

    /// Set the per-zone capacity (at least one sample).
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

type ZoneBuffer = Arc<Mutex<VecDeque<Sample>>>;

/// Append-only, per-zone ring buffer of samples.
///
/// Each zone has its own lock, so recording into one zone never waits on
/// another. The outer map lock is only held long enough to find (or create)
/// a zone's buffer.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use airtouch_store::{SampleStore, StoreConfig};
/// use airtouch_types::{Clock, ManualClock, Sample, ZoneId};
/// use time::{Date, Duration, OffsetDateTime};
///
/// let start = OffsetDateTime::UNIX_EPOCH + Duration::days(1);
/// let clock = Arc::new(ManualClock::new(start));
/// let store = SampleStore::new(StoreConfig::default(), clock.clone());
/// let zone = ZoneId::new("hall").unwrap();
///
/// store.record(Sample::new(zone.clone(), start, 21.5, 0.3, true))?;
/// clock.advance(Duration::minutes(1));
/// store.record(Sample::new(zone.clone(), clock.now(), 21.7, 0.3, true))?;
///
/// assert_eq!(store.window(&zone, Duration::minutes(5)).len(), 2);
/// # Ok::<(), airtouch_store::Error>(())
/// ```
pub struct SampleStore {
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    zones: RwLock<HashMap<ZoneId, ZoneBuffer>>,
}

impl std::fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStore")
            .field("config", &self.config)
            .field("zones", &self.zones.read().len())
            .finish()
    }
}

impl SampleStore {
    /// Create an empty store.
    pub fn new(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            zones: RwLock::new(HashMap::new()),
        }
    }

    /// The retention limits in use.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn buffer(&self, zone: &ZoneId) -> Option<ZoneBuffer> {
        self.zones.read().get(zone).cloned()
    }

    fn buffer_or_insert(&self, zone: &ZoneId) -> ZoneBuffer {
        if let Some(buffer) = self.buffer(zone) {
            return buffer;
        }
        self.zones
            .write()
            .entry(zone.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    fn evict(&self, samples: &mut VecDeque<Sample>, now: OffsetDateTime) -> usize {
        let cutoff = window_start(now, self.config.history);
        let before = samples.len();
        while samples.front().is_some_and(|s| s.timestamp < cutoff) {
            samples.pop_front();
        }
        before - samples.len()
    }

    /// Append a sample to its zone.
    ///
    /// Samples older than the retention window are evicted from the zone on
    /// the way in, and the oldest sample is dropped when the zone is full.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfOrderSample`] if the sample is older than the newest one
    /// already stored for the zone. Equal timestamps are accepted.
    pub fn record(&self, sample: Sample) -> Result<()> {
        let buffer = self.buffer_or_insert(&sample.zone);
        let mut samples = buffer.lock();

        if let Some(last) = samples.back()
            && sample.timestamp < last.timestamp
        {
            return Err(Error::OutOfOrderSample {
                zone: sample.zone,
                last: last.timestamp,
                attempted: sample.timestamp,
            });
        }

        let evicted = self.evict(&mut samples, self.clock.now());
        if evicted > 0 {
            trace!(zone = %sample.zone, evicted, "Evicted expired samples");
        }
        if samples.len() >= self.config.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
        Ok(())
    }

    /// Check whether `sample` could be recorded without writing it.
    ///
    /// # Errors
    ///
    /// The same [`Error::OutOfOrderSample`] that [`record`](Self::record)
    /// would return.
    pub fn check_order(&self, sample: &Sample) -> Result<()> {
        let Some(buffer) = self.buffer(&sample.zone) else {
            return Ok(());
        };
        let samples = buffer.lock();
        match samples.back() {
            Some(last) if sample.timestamp < last.timestamp => Err(Error::OutOfOrderSample {
                zone: sample.zone.clone(),
                last: last.timestamp,
                attempted: sample.timestamp,
            }),
            _ => Ok(()),
        }
    }

    /// Samples of `zone` with timestamps in `[now - duration, now]`, oldest
    /// first. Empty when the zone has none.
    pub fn window(&self, zone: &ZoneId, duration: Duration) -> Vec<Sample> {
        let now = self.clock.now();
        self.between(zone, window_start(now, duration), now)
    }

    fn between(&self, zone: &ZoneId, from: OffsetDateTime, now: OffsetDateTime) -> Vec<Sample> {
        let Some(buffer) = self.buffer(zone) else {
            return Vec::new();
        };
        buffer
            .lock()
            .iter()
            .filter(|s| s.timestamp >= from && s.timestamp <= now)
            .cloned()
            .collect()
    }

    /// Resampled view of [`window`](Self::window).
    ///
    /// The returned iterator owns a snapshot of the window, so it can be
    /// cloned and consumed after further samples are recorded. No point is
    /// stamped before `now - duration`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInterval`] if `interval` is shorter than one second.
    pub fn resample(
        &self,
        zone: &ZoneId,
        interval: Duration,
        duration: Duration,
    ) -> Result<Resample<std::vec::IntoIter<Sample>>> {
        let now = self.clock.now();
        let from = window_start(now, duration);
        Ok(Resample::new(self.between(zone, from, now).into_iter(), interval)?.floor(from))
    }

    /// Newest sample of `zone`.
    pub fn latest(&self, zone: &ZoneId) -> Option<Sample> {
        self.buffer(zone)?.lock().back().cloned()
    }

    /// Evict expired samples from every zone, returning how many were removed.
    ///
    /// Zones are compacted one at a time; recording into or reading from a
    /// zone only waits while that zone is being compacted.
    pub fn compact(&self) -> usize {
        let buffers: Vec<(ZoneId, ZoneBuffer)> = self
            .zones
            .read()
            .iter()
            .map(|(zone, buffer)| (zone.clone(), Arc::clone(buffer)))
            .collect();

        let now = self.clock.now();
        let mut total = 0;
        for (zone, buffer) in buffers {
            let evicted = self.evict(&mut buffer.lock(), now);
            if evicted > 0 {
                debug!(zone = %zone, evicted, "Compacted zone history");
            }
            total += evicted;
        }
        total
    }

    /// Forget a zone entirely. Returns whether it had any history.
    pub fn drop_zone(&self, zone: &ZoneId) -> bool {
        self.zones.write().remove(zone).is_some()
    }

    /// Number of samples held for `zone`.
    pub fn len(&self, zone: &ZoneId) -> usize {
        self.buffer(zone).map_or(0, |b| b.lock().len())
    }

    /// Whether `zone` has no samples.
    pub fn is_empty(&self, zone: &ZoneId) -> bool {
        self.len(zone) == 0
    }

    /// Zones with a history buffer, sorted.
    pub fn zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self.zones.read().keys().cloned().collect();
        zones.sort();
        zones
    }
}

/// `now - duration`, saturating at the earliest representable instant.
fn window_start(now: OffsetDateTime, duration: Duration) -> OffsetDateTime {
    now.checked_sub(duration)
        .unwrap_or_else(|| Date::MIN.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use airtouch_types::ManualClock;
    use proptest::prelude::*;

    fn start() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::days(30)
    }

    fn zone(id: &str) -> ZoneId {
        ZoneId::new(id).unwrap()
    }

    fn sample(id: &str, at: OffsetDateTime, temp: f64) -> Sample {
        Sample::new(zone(id), at, temp, 0.3, true)
    }

    fn store(config: StoreConfig) -> (SampleStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (SampleStore::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_record_and_window() {
        let (store, clock) = store(StoreConfig::default());
        for i in 0..5 {
            store.record(sample("a", clock.now(), 20.0 + i as f64)).unwrap();
            clock.advance(Duration::minutes(1));
        }

        let window = store.window(&zone("a"), Duration::minutes(2));
        // now = start + 5m: samples at 3m and 4m qualify, 2m is 3 minutes old.
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].measured_temperature, 23.0);
        assert_eq!(window[1].measured_temperature, 24.0);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let (store, clock) = store(StoreConfig::default());
        store.record(sample("a", start(), 20.0)).unwrap();
        clock.advance(Duration::minutes(10));
        assert_eq!(store.window(&zone("a"), Duration::minutes(10)).len(), 1);
        assert!(store.window(&zone("a"), Duration::minutes(9)).is_empty());
    }

    #[test]
    fn test_window_excludes_future_samples() {
        let (store, _clock) = store(StoreConfig::default());
        store
            .record(sample("a", start() + Duration::minutes(1), 20.0))
            .unwrap();
        assert!(store.window(&zone("a"), Duration::minutes(60)).is_empty());
    }

    #[test]
    fn test_unknown_zone_is_empty() {
        let (store, _clock) = store(StoreConfig::default());
        assert!(store.window(&zone("nope"), Duration::minutes(5)).is_empty());
        assert!(store.is_empty(&zone("nope")));
        assert!(store.latest(&zone("nope")).is_none());
    }

    #[test]
    fn test_out_of_order_rejected_not_reordered() {
        let (store, _clock) = store(StoreConfig::default());
        store.record(sample("a", start(), 20.0)).unwrap();

        let early = sample("a", start() - Duration::seconds(1), 19.0);
        assert!(matches!(
            store.check_order(&early),
            Err(Error::OutOfOrderSample { .. })
        ));
        let err = store.record(early).unwrap_err();
        assert!(matches!(err, Error::OutOfOrderSample { .. }));
        assert_eq!(store.len(&zone("a")), 1);

        // Equal timestamps are fine, and other zones are unaffected.
        store.record(sample("a", start(), 20.5)).unwrap();
        store
            .record(sample("b", start() - Duration::hours(1), 20.0))
            .unwrap();
        assert_eq!(store.len(&zone("a")), 2);
    }

    #[test]
    fn test_record_evicts_expired() {
        let (store, clock) = store(StoreConfig::default().history(Duration::minutes(10)));
        store.record(sample("a", clock.now(), 20.0)).unwrap();
        clock.advance(Duration::minutes(11));
        store.record(sample("a", clock.now(), 21.0)).unwrap();

        assert_eq!(store.len(&zone("a")), 1);
        assert_eq!(store.latest(&zone("a")).unwrap().measured_temperature, 21.0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let (store, clock) = store(StoreConfig::default().capacity(3));
        for i in 0..5 {
            store.record(sample("a", clock.now(), i as f64)).unwrap();
            clock.advance(Duration::seconds(1));
        }
        let temps: Vec<f64> = store
            .window(&zone("a"), Duration::minutes(1))
            .iter()
            .map(|s| s.measured_temperature)
            .collect();
        assert_eq!(temps, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_compact_all_zones() {
        let (store, clock) = store(StoreConfig::default().history(Duration::minutes(5)));
        store.record(sample("a", clock.now(), 20.0)).unwrap();
        store.record(sample("b", clock.now(), 20.0)).unwrap();
        clock.advance(Duration::minutes(3));
        store.record(sample("b", clock.now(), 21.0)).unwrap();
        clock.advance(Duration::minutes(3));

        assert_eq!(store.compact(), 2);
        assert_eq!(store.len(&zone("a")), 0);
        assert_eq!(store.len(&zone("b")), 1);
        assert_eq!(store.compact(), 0);
    }

    #[test]
    fn test_drop_zone_and_zones() {
        let (store, clock) = store(StoreConfig::default());
        store.record(sample("b", clock.now(), 20.0)).unwrap();
        store.record(sample("a", clock.now(), 20.0)).unwrap();
        assert_eq!(store.zones(), vec![zone("a"), zone("b")]);

        assert!(store.drop_zone(&zone("a")));
        assert!(!store.drop_zone(&zone("a")));
        assert_eq!(store.zones(), vec![zone("b")]);
    }

    #[test]
    fn test_resample_snapshot() {
        let (store, clock) = store(StoreConfig::default());
        clock.set(OffsetDateTime::UNIX_EPOCH + Duration::hours(10));
        for temp in [20.0, 22.0] {
            store.record(sample("a", clock.now(), temp)).unwrap();
            clock.advance(Duration::seconds(20));
        }

        let points = store
            .resample(&zone("a"), Duration::minutes(1), Duration::minutes(5))
            .unwrap();
        let again = points.clone();
        let points: Vec<_> = points.collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].mean_temperature, 21.0);
        assert_eq!(points[0].sample_count, 2);
        assert_eq!(again.count(), 1);

        assert!(matches!(
            store.resample(&zone("a"), Duration::ZERO, Duration::minutes(5)),
            Err(Error::InvalidInterval(_))
        ));
    }

    #[test]
    fn test_resample_points_start_inside_window() {
        let (store, clock) = store(StoreConfig::default());
        let ten = OffsetDateTime::UNIX_EPOCH + Duration::hours(10);
        clock.set(ten + Duration::seconds(270));
        store.record(sample("a", clock.now(), 21.0)).unwrap();
        clock.set(ten + Duration::minutes(7));

        let points: Vec<_> = store
            .resample(&zone("a"), Duration::minutes(5), Duration::minutes(3))
            .unwrap()
            .collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, ten + Duration::minutes(4));
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let (store, clock) = store(StoreConfig::default().history(Duration::MAX));
        store.record(sample("a", clock.now(), 20.0)).unwrap();
        assert_eq!(store.window(&zone("a"), Duration::MAX).len(), 1);
        assert_eq!(store.compact(), 0);
    }

    #[test]
    fn test_concurrent_zones() {
        let (store, clock) = store(StoreConfig::default());
        let store = Arc::new(store);
        let now = clock.now();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("zone-{}", i);
                    for _ in 0..100 {
                        store.record(sample(&id, now, 20.0)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.zones().len(), 4);
        assert!(store.zones().iter().all(|z| store.len(z) == 100));
    }

    proptest! {
        #[test]
        fn prop_window_and_resample_stay_in_range(
            gaps in prop::collection::vec(0i64..300, 1..60),
            window_minutes in 1i64..120,
            interval_secs in 1i64..900,
        ) {
            let (store, clock) = store(StoreConfig::default().history(Duration::hours(10)));
            for gap in &gaps {
                clock.advance(Duration::seconds(*gap));
                store.record(sample("a", clock.now(), 20.0)).unwrap();
            }

            let now = clock.now();
            let duration = Duration::minutes(window_minutes);
            let window = store.window(&zone("a"), duration);
            for s in &window {
                prop_assert!(s.timestamp >= now - duration && s.timestamp <= now);
            }
            prop_assert!(window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

            let interval = Duration::seconds(interval_secs);
            let points: Vec<_> = store.resample(&zone("a"), interval, duration).unwrap().collect();
            let total: usize = points.iter().map(|p| p.sample_count).sum();
            prop_assert_eq!(total, window.len());
            for p in &points {
                prop_assert!(p.sample_count > 0);
                prop_assert!(p.timestamp >= now - duration);
                prop_assert!(p.timestamp <= now);
            }
            prop_assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        }
    }
}
