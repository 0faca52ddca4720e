//! Host metric acquisition.
//!
//! [`MetricSource`] abstracts the OS primitives; [`SysinfoSource`] is the
//! production implementation. [`sample_once`] performs one sampler tick.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sysinfo::System;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::SampleStore;
use crate::types::{LoadAverages, Sample};

/// Source of instantaneous host readings.
pub trait MetricSource: Send + Sync + std::fmt::Debug {
    /// Current CPU utilization percentage.
    fn cpu_percent(&self) -> f64;

    /// Current memory utilization percentage.
    fn mem_percent(&self) -> f64;

    /// OS load averages, or `None` when the platform cannot provide them.
    fn load_averages(&self) -> Option<LoadAverages>;

    /// Returns the name of this source for logging purposes.
    fn name(&self) -> &'static str;
}

/// Reads host metrics through `sysinfo`.
///
/// The `System` handle is kept between readings: CPU usage is the delta since
/// the previous refresh, so the very first reading may be zero.
#[derive(Debug)]
pub struct SysinfoSource {
    system: Mutex<System>,
}

impl SysinfoSource {
    /// Creates a source and primes the CPU counters.
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoSource {
    fn cpu_percent(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        f64::from(system.global_cpu_usage())
    }

    fn mem_percent(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        system.used_memory() as f64 / total as f64 * 100.0
    }

    fn load_averages(&self) -> Option<LoadAverages> {
        if !sysinfo::IS_SUPPORTED_SYSTEM || cfg!(windows) {
            return None;
        }
        let load = System::load_average();
        let loads = LoadAverages::new(load.one, load.five, load.fifteen);
        let valid = [loads.one, loads.five, loads.fifteen]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0);
        valid.then_some(loads)
    }

    fn name(&self) -> &'static str {
        "sysinfo"
    }
}

/// A source returning fixed readings.
///
/// Useful for tests and for hosts where OS counters must not be touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSource {
    /// CPU percentage returned on every read.
    pub cpu_percent: f64,
    /// Memory percentage returned on every read.
    pub mem_percent: f64,
    /// Load averages returned on every read; `None` simulates an unsupported platform.
    pub loads: Option<LoadAverages>,
}

impl StaticSource {
    /// Creates a static source with the given readings.
    #[must_use]
    pub const fn new(cpu_percent: f64, mem_percent: f64, loads: Option<LoadAverages>) -> Self {
        Self {
            cpu_percent,
            mem_percent,
            loads,
        }
    }
}

impl MetricSource for StaticSource {
    fn cpu_percent(&self) -> f64 {
        self.cpu_percent
    }

    fn mem_percent(&self) -> f64 {
        self.mem_percent
    }

    fn load_averages(&self) -> Option<LoadAverages> {
        self.loads
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Takes one reading from `source` stamped with `now`.
///
/// Missing load averages degrade to zeros.
#[must_use]
pub fn read_sample(source: &dyn MetricSource, now: DateTime<Utc>) -> Sample {
    let cpu = source.cpu_percent();
    let mem = source.mem_percent();
    let loads = source.load_averages().unwrap_or_else(|| {
        debug!(source = source.name(), "load averages unavailable, using zeros");
        LoadAverages::default()
    });
    Sample::new(now, cpu, mem, loads)
}

/// One sampler tick: read the host and upsert the sample.
///
/// # Errors
///
/// Returns an error if the store write fails. Acquisition itself never fails.
pub fn sample_once(source: &dyn MetricSource, store: &dyn SampleStore) -> Result<Sample> {
    let sample = read_sample(source, Utc::now());
    if let Err(e) = store.upsert(&sample) {
        warn!(error = %e, "failed to store sample");
        return Err(e);
    }
    debug!(
        source = source.name(),
        cpu = sample.cpu_percent,
        mem = sample.mem_percent,
        load_1m = sample.load_1m,
        "sampled host"
    );
    Ok(sample)
}
