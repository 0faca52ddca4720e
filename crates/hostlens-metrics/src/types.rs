//! Core types for the sample store.
//!
//! - [`Sample`]: one host observation keyed by its timestamp
//! - [`LoadAverages`]: the 1/5/15 minute OS load averages
//! - [`Window`]: an ordered, ephemeral slice of samples over a trailing duration

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// Formats a timestamp as the store key.
///
/// Fixed microsecond precision with a `Z` suffix, so lexicographic order of
/// keys equals temporal order.
#[must_use]
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a store key produced by [`format_timestamp`].
///
/// # Errors
///
/// Returns `MetricsError::Timestamp` if the value is not RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| MetricsError::Timestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// OS load averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverages {
    /// 1 minute load average.
    pub one: f64,
    /// 5 minute load average.
    pub five: f64,
    /// 15 minute load average.
    pub fifteen: f64,
}

impl LoadAverages {
    /// Creates load averages from the three readings.
    #[must_use]
    pub const fn new(one: f64, five: f64, fifteen: f64) -> Self {
        Self { one, five, fifteen }
    }
}

/// A single host observation.
///
/// Percentages are nominally in `[0, 100]` but are stored as read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Observation instant; unique within the store.
    pub timestamp: DateTime<Utc>,
    /// CPU utilization percentage.
    pub cpu_percent: f64,
    /// Memory utilization percentage.
    pub mem_percent: f64,
    /// 1 minute load average.
    pub load_1m: f64,
    /// 5 minute load average.
    pub load_5m: f64,
    /// 15 minute load average.
    pub load_15m: f64,
}

impl Sample {
    /// Number of numeric features carried by a sample.
    pub const FEATURE_COUNT: usize = 5;

    /// Creates a new sample.
    ///
    /// The timestamp is truncated to microseconds, the precision of the store key.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        cpu_percent: f64,
        mem_percent: f64,
        loads: LoadAverages,
    ) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(6),
            cpu_percent,
            mem_percent,
            load_1m: loads.one,
            load_5m: loads.five,
            load_15m: loads.fifteen,
        }
    }

    /// Returns the store key for this sample.
    #[must_use]
    pub fn key(&self) -> String {
        format_timestamp(self.timestamp)
    }

    /// Returns the load averages of this sample.
    #[must_use]
    pub const fn loads(&self) -> LoadAverages {
        LoadAverages::new(self.load_1m, self.load_5m, self.load_15m)
    }

    /// Returns `(cpu, mem, load_1m, load_5m, load_15m)`.
    #[must_use]
    pub const fn features(&self) -> [f64; Self::FEATURE_COUNT] {
        [
            self.cpu_percent,
            self.mem_percent,
            self.load_1m,
            self.load_5m,
            self.load_15m,
        ]
    }
}

/// Samples within `[since, until]`, ascending by timestamp.
///
/// Windows are recomputed per query and never persisted. An empty window is a
/// valid result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    samples: Vec<Sample>,
}

impl Window {
    /// Creates a window, sorting the samples if they are not already ascending.
    #[must_use]
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>, mut samples: Vec<Sample>) -> Self {
        if !samples.is_sorted_by_key(|s| s.timestamp) {
            samples.sort_by_key(|s| s.timestamp);
        }
        Self {
            since,
            until,
            samples,
        }
    }

    /// Inclusive lower bound of the window.
    #[must_use]
    pub const fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Reference instant the window was computed at.
    #[must_use]
    pub const fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// The ordered samples.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Consumes the window, returning its samples.
    #[must_use]
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Number of samples in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no sample qualified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The last `n` samples (fewer if the window is smaller), still ascending.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[Sample] {
        let start = self.samples.len().saturating_sub(n);
        &self.samples[start..]
    }
}
