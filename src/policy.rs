//! Collection-name retention policies.
//!
//! A collection's retention rule is derived entirely from its name prefix.
//! The rule table is ordered and the first matching prefix wins:
//!
//! | prefix                        | timestamp field | unit              |
//! |-------------------------------|-----------------|-------------------|
//! | `stat`, `event`, `alarm`      | `time`          | epoch milliseconds |
//! | `session`                     | `assoc_time`    | epoch seconds     |
//! | `user`                        | `last_seen`     | epoch seconds     |
//!
//! Collections matching none of these are not subject to retention and are
//! skipped.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

const MILLIS_PER_DAY: i64 = 86_400_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// Unit in which a collection stores its timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Milliseconds since the Unix epoch.
    Milliseconds,
    /// Seconds since the Unix epoch.
    Seconds,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Milliseconds => write!(f, "ms"),
            TimeUnit::Seconds => write!(f, "s"),
        }
    }
}

/// Retention rule applied to a collection: records whose `timestamp_field`
/// lies before the run's cutoff are eligible for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    pub timestamp_field: &'static str,
    pub unit: TimeUnit,
}

impl RetentionPolicy {
    pub const fn new(timestamp_field: &'static str, unit: TimeUnit) -> Self {
        Self {
            timestamp_field,
            unit,
        }
    }

    /// The cutoff value for this policy, in the policy's own unit.
    pub fn cutoff(&self, cutoffs: &Cutoffs) -> f64 {
        match self.unit {
            TimeUnit::Milliseconds => cutoffs.millis,
            TimeUnit::Seconds => cutoffs.seconds,
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.timestamp_field, self.unit)
    }
}

const TIME_MILLIS: RetentionPolicy = RetentionPolicy::new("time", TimeUnit::Milliseconds);
const ASSOC_TIME_SECONDS: RetentionPolicy = RetentionPolicy::new("assoc_time", TimeUnit::Seconds);
const LAST_SEEN_SECONDS: RetentionPolicy = RetentionPolicy::new("last_seen", TimeUnit::Seconds);

/// Ordered prefix table. Lookup stops at the first matching entry.
pub const POLICY_TABLE: &[(&str, RetentionPolicy)] = &[
    ("stat", TIME_MILLIS),
    ("event", TIME_MILLIS),
    ("alarm", TIME_MILLIS),
    ("session", ASSOC_TIME_SECONDS),
    ("user", LAST_SEEN_SECONDS),
];

/// Resolve the retention policy for a collection name.
///
/// Matching is a case-sensitive prefix test: `"statistics_v2"` resolves,
/// `"mystat"` and `"Stat"` do not.
pub fn resolve(collection: &str) -> Option<RetentionPolicy> {
    POLICY_TABLE
        .iter()
        .find(|(prefix, _)| collection.starts_with(prefix))
        .map(|(_, policy)| *policy)
}

/// Cutoff instant for a whole run, pre-rendered in both timestamp units.
///
/// Both values derive from a single `now` sample, so every collection in a
/// run is compared against the same instant regardless of unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cutoffs {
    /// `now - retention` in epoch milliseconds.
    pub millis: f64,
    /// `now - retention` in epoch seconds (fractional).
    pub seconds: f64,
}

impl Cutoffs {
    /// Compute the cutoffs for `retention_days` before `now`.
    pub fn at(now: DateTime<Utc>, retention_days: u32) -> Self {
        let days = i64::from(retention_days);
        let now_millis = now.timestamp_millis();
        Self {
            millis: (now_millis - days * MILLIS_PER_DAY) as f64,
            seconds: now_millis as f64 / 1000.0 - (days * SECONDS_PER_DAY) as f64,
        }
    }
}
