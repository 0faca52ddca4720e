//! Demo history bootstrap.
//!
//! On a fresh store the analytics pipelines have nothing to work with until
//! enough real samples accumulate. [`seed_demo_if_needed`] fills the gap with
//! smooth synthetic signals plus noise.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::SampleStore;
use crate::types::{LoadAverages, Sample};

/// Default row count below which the store is seeded.
pub const DEFAULT_MIN_ROWS: usize = 60;

/// Default number of synthesized samples.
pub const DEFAULT_SEED_COUNT: usize = 180;

/// Default spacing between synthesized samples, in seconds.
pub const DEFAULT_SPACING_SECS: i64 = 10;

/// Seeder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedConfig {
    /// Seed only when the store holds fewer rows than this.
    pub min_rows: usize,
    /// Number of samples to synthesize.
    pub count: usize,
    /// Spacing between samples.
    pub spacing: Duration,
    /// Fixed RNG seed; `None` draws from OS entropy.
    pub rng_seed: Option<u64>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            min_rows: DEFAULT_MIN_ROWS,
            count: DEFAULT_SEED_COUNT,
            spacing: Duration::seconds(DEFAULT_SPACING_SECS),
            rng_seed: None,
        }
    }
}

impl SeedConfig {
    /// Sets a fixed RNG seed.
    #[must_use]
    pub const fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Sets the number of synthesized samples.
    #[must_use]
    pub const fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

/// Seeds the store with demo history if it holds fewer than `min_rows` rows.
///
/// Returns the number of rows written (zero when the store was already
/// populated).
///
/// # Errors
///
/// Returns an error if counting or writing fails.
pub fn seed_demo_if_needed(store: &dyn SampleStore, config: &SeedConfig) -> Result<usize> {
    let existing = store.count()?;
    if existing >= config.min_rows {
        debug!(existing, min_rows = config.min_rows, "store already populated, skipping seed");
        return Ok(0);
    }

    let mut rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let samples = synthesize(Utc::now(), config, &mut rng);
    store.upsert_batch(&samples)?;

    info!(rows = samples.len(), existing, "seeded demo history");
    Ok(samples.len())
}

/// Builds `config.count` samples ending one spacing before `now`.
pub fn synthesize(now: DateTime<Utc>, config: &SeedConfig, rng: &mut impl Rng) -> Vec<Sample> {
    let count = config.count;
    (0..count)
        .map(|i| {
            let steps_back = i32::try_from(count - i).unwrap_or(i32::MAX);
            let ts = now - config.spacing * steps_back;
            let t = i as f64;

            let cpu = clamp_percent(30.0 + 10.0 * (t / 10.0).sin() + normal(rng) * 2.0);
            let mem = clamp_percent(45.0 + 5.0 * (t / 15.0).cos() + normal(rng) * 1.5);
            let loads = LoadAverages::new(
                (0.2 + 0.05 * (t / 20.0).sin()).max(0.0),
                (0.15 + 0.03 * (t / 22.0).cos()).max(0.0),
                (0.1 + 0.02 * (t / 25.0).sin()).max(0.0),
            );
            Sample::new(ts, cpu, mem, loads)
        })
        .collect()
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Standard normal draw (Box-Muller).
fn normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySampleStore;
    use chrono::TimeZone;

    fn config() -> SeedConfig {
        SeedConfig::default().with_rng_seed(7)
    }

    #[test]
    fn empty_store_gets_full_history() {
        let store = MemorySampleStore::new();
        let written = seed_demo_if_needed(&store, &config()).unwrap();
        assert_eq!(written, DEFAULT_SEED_COUNT);
        assert_eq!(store.count().unwrap(), DEFAULT_SEED_COUNT);
    }

    #[test]
    fn populated_store_is_left_alone() {
        let store = MemorySampleStore::new();
        seed_demo_if_needed(&store, &config()).unwrap();

        for _ in 0..2 {
            assert_eq!(seed_demo_if_needed(&store, &config()).unwrap(), 0);
            assert_eq!(store.count().unwrap(), DEFAULT_SEED_COUNT);
        }
    }

    #[test]
    fn store_just_below_threshold_is_seeded() {
        let store = MemorySampleStore::new();
        let base = Utc.timestamp_opt(1_600_000_000, 0).single().unwrap();
        for i in 0..59 {
            store
                .upsert(&Sample::new(base + Duration::seconds(i), 1.0, 1.0, LoadAverages::default()))
                .unwrap();
        }
        assert_eq!(seed_demo_if_needed(&store, &config()).unwrap(), DEFAULT_SEED_COUNT);
        assert_eq!(store.count().unwrap(), 59 + DEFAULT_SEED_COUNT);
    }

    #[test]
    fn synthesized_samples_are_spaced_and_bounded() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let samples = synthesize(now, &SeedConfig::default(), &mut rng);

        assert_eq!(samples.len(), DEFAULT_SEED_COUNT);
        assert_eq!(samples[0].timestamp, now - Duration::seconds(1800));
        assert_eq!(samples[179].timestamp, now - Duration::seconds(10));
        assert!(samples
            .windows(2)
            .all(|w| w[1].timestamp - w[0].timestamp == Duration::seconds(10)));

        for s in &samples {
            assert!((0.0..=100.0).contains(&s.cpu_percent));
            assert!((0.0..=100.0).contains(&s.mem_percent));
            assert!(s.load_1m >= 0.0 && s.load_5m >= 0.0 && s.load_15m >= 0.0);
        }
    }

    #[test]
    fn same_seed_gives_same_history() {
        let now = Utc::now();
        let a = synthesize(now, &SeedConfig::default(), &mut StdRng::seed_from_u64(3));
        let b = synthesize(now, &SeedConfig::default(), &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn noise_is_roughly_standard() {
        let mut rng = StdRng::seed_from_u64(11);
        let draws: Vec<f64> = (0..20_000).map(|_| normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }
}
