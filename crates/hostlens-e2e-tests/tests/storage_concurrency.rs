//! Concurrent access to the SQLite sample store.
//!
//! These tests verify:
//! 1. A writer and several readers share one store without errors
//! 2. Two connections on the same file see each other's rows
//! 3. Racing writes to one timestamp leave exactly one row

mod helpers;

use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use hostlens_metrics::{load_window, LoadAverages, Sample, SampleStore, SqliteSampleStore};
use helpers::*;

fn sample_at(secs: i64, cpu: f64) -> Sample {
    Sample::new(
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        cpu,
        40.0,
        LoadAverages::new(0.2, 0.2, 0.2),
    )
}

#[test]
fn test_writer_and_readers_share_a_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let start = Utc::now() - Duration::minutes(30);

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..150 {
                let ts = start + Duration::seconds(10 * i);
                store
                    .upsert(&Sample::new(ts, 20.0, 40.0, LoadAverages::new(0.1, 0.1, 0.1)))
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..50 {
                    let window = load_window(store.as_ref(), 60.0).unwrap();
                    assert!(window.len() >= last, "window shrank from {last} to {}", window.len());
                    assert!(window.samples().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
                    last = window.len();
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.count().unwrap(), 150);
}

#[test]
fn test_two_connections_on_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.db");
    let first = SqliteSampleStore::open(&path).unwrap();
    let second = SqliteSampleStore::open(&path).unwrap();

    let handles: Vec<_> = [(first, 0), (second, 1)]
        .into_iter()
        .map(|(store, offset)| {
            thread::spawn(move || {
                for i in 0..50 {
                    store.upsert(&sample_at(2 * i + offset, 10.0)).unwrap();
                }
                store
            })
        })
        .collect();
    let stores: Vec<SqliteSampleStore> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for store in &stores {
        assert_eq!(store.count().unwrap(), 100);
    }
}

#[test]
fn test_racing_writes_to_one_timestamp_leave_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..20 {
                    store.upsert(&sample_at(0, f64::from(worker))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.count().unwrap(), 1);
    let row = &store.latest(1).unwrap()[0];
    assert!((0.0..8.0).contains(&row.cpu_percent));
    assert_eq!(row.cpu_percent.fract(), 0.0);
}

#[test]
fn test_batch_and_single_writes_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());

    let batch = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let rows: Vec<Sample> = (0..100).map(|i| sample_at(i, 1.0)).collect();
            store.upsert_batch(&rows).unwrap();
        })
    };
    let singles = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 100..150 {
                store.upsert(&sample_at(i, 2.0)).unwrap();
            }
        })
    };
    batch.join().unwrap();
    singles.join().unwrap();

    assert_eq!(store.count().unwrap(), 150);
    let latest = store.latest(5).unwrap();
    assert!(latest.iter().all(|s| s.cpu_percent == 2.0));
}
