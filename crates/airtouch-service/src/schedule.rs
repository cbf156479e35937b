//! Wall-clock scheduling: the daily sleep window and cycle alignment.

use time::{Duration, OffsetDateTime, Time, UtcOffset};

use airtouch_types::TargetMode;

use crate::config::TargetsConfig;

/// Errors building a [`SleepSchedule`].
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid time of day '{value}': expected HH:MM ({source})")]
    TimeOfDay {
        value: String,
        source: time::error::Parse,
    },
    #[error("invalid time format description: {0}")]
    Format(#[from] time::error::InvalidFormatDescription),
    #[error("invalid UTC offset of {minutes} minutes: {source}")]
    Offset {
        minutes: i32,
        source: time::error::ComponentRange,
    },
}

/// Parse a 24-hour `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<Time, ScheduleError> {
    let format = time::format_description::parse("[hour]:[minute]")?;
    Time::parse(value.trim(), &format).map_err(|source| ScheduleError::TimeOfDay {
        value: value.to_string(),
        source,
    })
}

/// Daily window during which zones follow the sleep target.
///
/// The window is `[start, end)` in local time and may wrap past midnight
/// (`22:00`-`06:00`). Equal start and end disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSchedule {
    start: Time,
    end: Time,
    offset: UtcOffset,
}

impl SleepSchedule {
    /// Create a schedule from local start/end times and the local offset.
    pub fn new(start: Time, end: Time, offset: UtcOffset) -> Self {
        Self { start, end, offset }
    }

    /// Build the schedule described by `[targets]`.
    pub fn from_config(targets: &TargetsConfig) -> Result<Self, ScheduleError> {
        let minutes = targets.utc_offset_minutes;
        let offset = UtcOffset::from_whole_seconds(minutes * 60)
            .map_err(|source| ScheduleError::Offset { minutes, source })?;
        Ok(Self::new(
            parse_time_of_day(&targets.sleep_start)?,
            parse_time_of_day(&targets.sleep_end)?,
            offset,
        ))
    }

    /// Whether `now` falls inside the sleep window.
    pub fn is_sleeping(&self, now: OffsetDateTime) -> bool {
        let local = now.to_offset(self.offset).time();
        if self.start == self.end {
            false
        } else if self.start < self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }

    /// Comfort mode at `now` for a zone that follows the schedule.
    pub fn mode_at(&self, now: OffsetDateTime) -> TargetMode {
        if self.is_sleeping(now) {
            TargetMode::Sleep
        } else {
            TargetMode::Awake
        }
    }
}

/// Time left until the next whole multiple of `period` since the Unix epoch.
///
/// Returns zero when `now` sits exactly on a boundary. A non-positive period
/// also yields zero.
pub fn until_next_boundary(now: OffsetDateTime, period: Duration) -> std::time::Duration {
    let period_secs = period.whole_seconds();
    if period_secs <= 0 {
        return std::time::Duration::ZERO;
    }
    let into = Duration::new(
        now.unix_timestamp().rem_euclid(period_secs),
        now.nanosecond() as i32,
    );
    if into.is_zero() {
        std::time::Duration::ZERO
    } else {
        (period - into).unsigned_abs()
    }
}
