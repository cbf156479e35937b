//! TTL-bounded cache of last-known device state.
//!
//! The cache never evicts on its own. An entry older than the TTL, or one
//! explicitly invalidated after a failed command, is reported as
//! [`Lookup::Stale`] together with whatever was last known, and the caller
//! decides whether to refresh it from the driver.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use time::Duration;
use tracing::debug;

use airtouch_types::{Clock, DeviceState, ZoneId};

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The entry is younger than the TTL and has not been invalidated.
    Fresh(DeviceState),
    /// The entry must be refreshed before it can be trusted.
    Stale {
        /// The expired or invalidated entry, if the zone was ever cached.
        last_known: Option<DeviceState>,
    },
}

impl Lookup {
    /// Whether the lookup hit a fresh entry.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Lookup::Fresh(_))
    }

    /// The fresh state, if any.
    pub fn fresh(self) -> Option<DeviceState> {
        match self {
            Lookup::Fresh(state) => Some(state),
            Lookup::Stale { .. } => None,
        }
    }

    /// The best state available, fresh or not.
    pub fn into_last_known(self) -> Option<DeviceState> {
        match self {
            Lookup::Fresh(state) => Some(state),
            Lookup::Stale { last_known } => last_known,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    state: DeviceState,
    invalidated: bool,
}

/// Last-known [`DeviceState`] per zone.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use airtouch_store::{DeviceCache, Lookup};
/// use airtouch_types::{AcMode, DeviceState, ManualClock, ZoneId};
/// use time::{Duration, OffsetDateTime};
///
/// let clock = Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH));
/// let cache = DeviceCache::new(Duration::minutes(5), clock.clone());
/// let zone = ZoneId::new("hall").unwrap();
///
/// cache.put(&zone, DeviceState {
///     zone: zone.clone(),
///     set_temperature: 22.0,
///     airflow_fraction: 0.3,
///     power_on: true,
///     ac_mode: AcMode::Cool,
///     setpoint_min: 16.0,
///     setpoint_max: 30.0,
///     last_refreshed: OffsetDateTime::UNIX_EPOCH,
/// });
/// assert!(cache.get(&zone).is_fresh());
///
/// clock.advance(Duration::minutes(5));
/// assert!(!cache.get(&zone).is_fresh());
/// ```
pub struct DeviceCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<ZoneId, Entry>>,
}

impl std::fmt::Debug for DeviceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl DeviceCache {
    /// Create an empty cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a zone.
    ///
    /// Fresh means `now - last_refreshed < ttl` and not invalidated since the
    /// last [`put`](Self::put).
    pub fn get(&self, zone: &ZoneId) -> Lookup {
        let now = self.clock.now();
        match self.entries.lock().get(zone) {
            Some(entry) if !entry.invalidated && now - entry.state.last_refreshed < self.ttl => {
                Lookup::Fresh(entry.state.clone())
            }
            Some(entry) => Lookup::Stale {
                last_known: Some(entry.state.clone()),
            },
            None => Lookup::Stale { last_known: None },
        }
    }

    /// Store `state` for `zone`, stamping it as refreshed now.
    pub fn put(&self, zone: &ZoneId, mut state: DeviceState) {
        state.last_refreshed = self.clock.now();
        self.entries.lock().insert(
            zone.clone(),
            Entry {
                state,
                invalidated: false,
            },
        );
    }

    /// Force the next [`get`](Self::get) for `zone` to report stale.
    ///
    /// Returns whether the zone had an entry.
    pub fn invalidate(&self, zone: &ZoneId) -> bool {
        match self.entries.lock().get_mut(zone) {
            Some(entry) => {
                entry.invalidated = true;
                debug!(zone = %zone, "Invalidated cached device state");
                true
            }
            None => false,
        }
    }

    /// Remove a zone's entry, returning it.
    pub fn drop_zone(&self, zone: &ZoneId) -> Option<DeviceState> {
        self.entries.lock().remove(zone).map(|e| e.state)
    }

    /// Number of cached zones (fresh or stale).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
