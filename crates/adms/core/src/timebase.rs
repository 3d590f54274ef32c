//! Server and device clock reconciliation.
//!
//! Terminals report wall-clock time without any zone information. Each device
//! carries an offset relative to the server's own UTC offset, so a device's
//! absolute offset is `server + device`. Attendance days are always counted in
//! server-local terms.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Wire format for timestamps in both directions.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest offset accepted from fractional hours. Device offsets are relative
/// to the server, so two real zones (UTC-12 and UTC+14) can be 26 hours apart.
pub const MAX_OFFSET_HOURS: f64 = 26.0;

/// A UTC offset with half-hour granularity, stored in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TzOffset {
    minutes: i32,
}

impl TzOffset {
    /// Offset from whole minutes.
    pub const fn from_minutes(minutes: i32) -> Self {
        Self { minutes }
    }

    /// Offset from whole hours.
    pub const fn from_hours(hours: i32) -> Self {
        Self {
            minutes: hours * 60,
        }
    }

    /// Offset from fractional hours, rounded to the nearest half hour and
    /// clamped to [`MAX_OFFSET_HOURS`] either way. NaN reads as zero.
    pub fn from_hours_f64(hours: f64) -> Self {
        let hours = if hours.is_nan() {
            0.0
        } else {
            hours.clamp(-MAX_OFFSET_HOURS, MAX_OFFSET_HOURS)
        };
        let halves = (hours * 2.0).round() as i32;
        Self {
            minutes: halves * 30,
        }
    }

    /// Offset in minutes.
    pub const fn minutes(&self) -> i32 {
        self.minutes
    }

    /// Offset in fractional hours.
    pub fn hours(&self) -> f64 {
        f64::from(self.minutes) / 60.0
    }

    fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.minutes))
    }
}

impl std::ops::Add for TzOffset {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            minutes: self.minutes + rhs.minutes,
        }
    }
}

/// Renders as hours, e.g. `4`, `-3`, `5.5`.
impl std::fmt::Display for TzOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.minutes % 60 == 0 {
            write!(f, "{}", self.minutes / 60)
        } else {
            write!(f, "{}", self.hours())
        }
    }
}

impl serde::Serialize for TzOffset {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.hours())
    }
}

impl<'de> serde::Deserialize<'de> for TzOffset {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hours = f64::deserialize(deserializer)?;
        Ok(Self::from_hours_f64(hours))
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Converts between UTC, server-local and device-local time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timebase {
    server: TzOffset,
}

impl Timebase {
    /// Create a timebase for a server running at `server` UTC offset.
    pub fn new(server: TzOffset) -> Self {
        Self { server }
    }

    /// The server's own UTC offset.
    pub fn server_offset(&self) -> TzOffset {
        self.server
    }

    /// Absolute UTC offset of a device with the given relative offset.
    pub fn device_offset(&self, relative: TzOffset) -> TzOffset {
        self.server + relative
    }

    /// Interpret a device wall-clock reading as an instant.
    pub fn device_to_utc(&self, local: NaiveDateTime, relative: TzOffset) -> DateTime<Utc> {
        let utc = local - self.device_offset(relative).duration();
        DateTime::from_naive_utc_and_offset(utc, Utc)
    }

    /// Render an instant on a device's wall clock.
    pub fn utc_to_device(&self, at: DateTime<Utc>, relative: TzOffset) -> NaiveDateTime {
        at.naive_utc() + self.device_offset(relative).duration()
    }

    /// Server-local wall-clock reading of an instant.
    pub fn local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.naive_utc() + self.server.duration()
    }

    /// Server-local calendar day of an instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.local(at).date()
    }

    /// Instant of a server-local wall-clock reading.
    pub fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(local - self.server.duration(), Utc)
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` wire timestamp.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}

/// Render a wire timestamp.
pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}
