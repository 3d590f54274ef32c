//! Service tuning.

use adms_core::Timebase;
use chrono::NaiveTime;

/// Knobs shared by the service components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Server baseline offset and the conversions built on it.
    pub timebase: Timebase,
    /// Punches for the same device user closer than this are duplicates.
    pub dedup_window: chrono::Duration,
    /// Server-local time of day after which open sessions are auto-closed.
    pub auto_checkout_at: NaiveTime,
    /// How long a poll alias stays resolvable.
    pub alias_ttl: chrono::Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timebase: Timebase::default(),
            dedup_window: chrono::Duration::seconds(60),
            auto_checkout_at: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            alias_ttl: chrono::Duration::hours(24),
        }
    }
}
