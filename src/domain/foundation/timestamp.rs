//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
///
/// Billing dates travel as epoch milliseconds on the account-store wire;
/// provider APIs use epoch seconds. Both conversions live here so the rest
/// of the domain never touches raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Whole days from this timestamp until another, rounded up.
    ///
    /// Returns 0 when `other` is not in the future.
    pub fn days_until(&self, other: &Timestamp) -> u32 {
        let secs = other.0.signed_duration_since(self.0).num_seconds();
        if secs <= 0 {
            return 0;
        }
        (secs as u64).div_ceil(86_400) as u32
    }

    /// Creates a new timestamp by adding the specified number of days.
    ///
    /// Negative values subtract days.
    pub fn add_days(&self, days: impl Into<i64>) -> Self {
        Self(self.0 + Duration::days(days.into()))
    }

    /// Creates a new timestamp by subtracting the specified number of days.
    pub fn minus_days(&self, days: impl Into<i64>) -> Self {
        Self(self.0 - Duration::days(days.into()))
    }

    /// Creates a new timestamp by adding the specified number of seconds.
    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0 + Duration::seconds(secs as i64))
    }

    /// Creates a timestamp from Unix seconds.
    pub fn from_unix_secs(secs: u64) -> Self {
        Self(Utc.timestamp_opt(secs as i64, 0).unwrap())
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> u64 {
        self.0.timestamp() as u64
    }

    /// Creates a timestamp from epoch milliseconds.
    pub fn from_epoch_ms(ms: i64) -> Self {
        Self(Utc.timestamp_millis_opt(ms).unwrap())
    }

    /// Returns the timestamp as epoch milliseconds.
    pub fn as_epoch_ms(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}
