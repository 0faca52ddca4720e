//! Sample storage.
//!
//! [`SampleStore`] is the contract every backend fulfils: keyed upserts and
//! ascending range scans. [`MemorySampleStore`] keeps everything in memory;
//! the durable backend lives in [`crate::sqlite`].

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::types::Sample;

/// A time-series table keyed by sample timestamp.
///
/// Every call is a short, self-contained operation. Implementations must not
/// hand out guards or cursors that outlive the call.
pub trait SampleStore: Send + Sync + std::fmt::Debug {
    /// Ensures backing structures exist. Safe to call more than once.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Inserts a sample, replacing any row with the same timestamp.
    fn upsert(&self, sample: &Sample) -> Result<()>;

    /// Upserts many samples as one unit.
    fn upsert_batch(&self, samples: &[Sample]) -> Result<()> {
        samples.iter().try_for_each(|s| self.upsert(s))
    }

    /// Returns all samples with `timestamp >= since`, ascending.
    fn query_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>>;

    /// Returns the total number of stored samples.
    fn count(&self) -> Result<usize>;

    /// Returns the `n` most recent samples, ascending.
    fn latest(&self, n: usize) -> Result<Vec<Sample>>;
}

/// Thread-safe in-memory sample store.
///
/// Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemorySampleStore {
    data: Arc<RwLock<BTreeMap<DateTime<Utc>, Sample>>>,
}

impl MemorySampleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the store holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Removes every sample.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl SampleStore for MemorySampleStore {
    fn upsert(&self, sample: &Sample) -> Result<()> {
        let mut data = self.data.write();
        let replaced = data.insert(sample.timestamp, sample.clone()).is_some();
        debug!(
            timestamp = %sample.timestamp,
            replaced,
            rows = data.len(),
            "upserted sample"
        );
        Ok(())
    }

    fn upsert_batch(&self, samples: &[Sample]) -> Result<()> {
        let mut data = self.data.write();
        for sample in samples {
            data.insert(sample.timestamp, sample.clone());
        }
        debug!(batch = samples.len(), rows = data.len(), "upserted sample batch");
        Ok(())
    }

    fn query_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        let data = self.data.read();
        Ok(data
            .range((Bound::Included(since), Bound::Unbounded))
            .map(|(_, s)| s.clone())
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.data.read().len())
    }

    fn latest(&self, n: usize) -> Result<Vec<Sample>> {
        let data = self.data.read();
        let mut recent: Vec<Sample> = data.values().rev().take(n).cloned().collect();
        recent.reverse();
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoadAverages;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn sample(secs: i64, cpu: f64) -> Sample {
        Sample::new(at(secs), cpu, 50.0, LoadAverages::new(0.2, 0.1, 0.05))
    }

    mod upsert_tests {
        use super::*;

        #[test]
        fn upsert_single_sample() {
            let store = MemorySampleStore::new();
            store.upsert(&sample(0, 10.0)).unwrap();
            assert_eq!(store.count().unwrap(), 1);
            assert!(!store.is_empty());
        }

        #[test]
        fn duplicate_timestamp_keeps_latest_write() {
            let store = MemorySampleStore::new();
            store.upsert(&sample(5, 10.0)).unwrap();
            store.upsert(&sample(5, 99.0)).unwrap();

            let rows = store.query_since(at(0)).unwrap();
            assert_eq!(rows.len(), 1);
            assert!((rows[0].cpu_percent - 99.0).abs() < f64::EPSILON);
        }

        #[test]
        fn batch_upsert_replaces_existing_keys() {
            let store = MemorySampleStore::new();
            store.upsert(&sample(1, 1.0)).unwrap();
            store
                .upsert_batch(&[sample(1, 2.0), sample(2, 3.0)])
                .unwrap();
            assert_eq!(store.count().unwrap(), 2);
        }

        #[test]
        fn clones_share_data() {
            let store = MemorySampleStore::new();
            let other = store.clone();
            store.upsert(&sample(0, 1.0)).unwrap();
            assert_eq!(other.count().unwrap(), 1);
            other.clear();
            assert!(store.is_empty());
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn query_is_ascending_regardless_of_insert_order() {
            let store = MemorySampleStore::new();
            for secs in [30, 10, 20] {
                store.upsert(&sample(secs, secs as f64)).unwrap();
            }
            let rows = store.query_since(at(0)).unwrap();
            let secs: Vec<f64> = rows.iter().map(|s| s.cpu_percent).collect();
            assert_eq!(secs, vec![10.0, 20.0, 30.0]);
        }

        #[test]
        fn lower_bound_is_inclusive() {
            let store = MemorySampleStore::new();
            store.upsert(&sample(10, 1.0)).unwrap();
            store.upsert(&sample(11, 2.0)).unwrap();
            let rows = store.query_since(at(10)).unwrap();
            assert_eq!(rows.len(), 2);
            let rows = store.query_since(at(10) + Duration::microseconds(1)).unwrap();
            assert_eq!(rows.len(), 1);
        }

        #[test]
        fn query_on_empty_store_is_empty() {
            let store = MemorySampleStore::new();
            assert!(store.query_since(at(0)).unwrap().is_empty());
        }

        #[test]
        fn latest_returns_most_recent_ascending() {
            let store = MemorySampleStore::new();
            for secs in 0..10 {
                store.upsert(&sample(secs, secs as f64)).unwrap();
            }
            let rows = store.latest(3).unwrap();
            let cpus: Vec<f64> = rows.iter().map(|s| s.cpu_percent).collect();
            assert_eq!(cpus, vec![7.0, 8.0, 9.0]);
        }
    }

    proptest! {
        #[test]
        fn prop_query_since_is_ordered_and_bounded(
            offsets in proptest::collection::vec(0i64..500, 0..60),
            cutoff in 0i64..500,
        ) {
            let store = MemorySampleStore::new();
            for (i, secs) in offsets.iter().enumerate() {
                store.upsert(&sample(*secs, i as f64)).unwrap();
            }

            let rows = store.query_since(at(cutoff)).unwrap();
            prop_assert!(rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            prop_assert!(rows.iter().all(|s| s.timestamp >= at(cutoff)));

            let expected = offsets
                .iter()
                .filter(|s| **s >= cutoff)
                .collect::<std::collections::BTreeSet<_>>()
                .len();
            prop_assert_eq!(rows.len(), expected);
        }

        #[test]
        fn prop_one_row_per_timestamp(
            offsets in proptest::collection::vec(0i64..50, 1..80),
        ) {
            let store = MemorySampleStore::new();
            for (i, secs) in offsets.iter().enumerate() {
                store.upsert(&sample(*secs, i as f64)).unwrap();
            }

            let distinct = offsets.iter().collect::<std::collections::BTreeSet<_>>().len();
            prop_assert_eq!(store.count().unwrap(), distinct);

            // The value stored for each key is the last one written.
            for row in store.query_since(at(0)).unwrap() {
                let secs = (row.timestamp - at(0)).num_seconds();
                let last_index = offsets.iter().rposition(|s| *s == secs).unwrap();
                prop_assert!((row.cpu_percent - last_index as f64).abs() < f64::EPSILON);
            }
        }
    }
}
