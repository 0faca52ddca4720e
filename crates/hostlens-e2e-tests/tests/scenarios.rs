//! End-to-end scenarios over a SQLite store.
//!
//! These tests verify:
//! 1. Demo seeding fills an empty store exactly once
//! 2. Forecast, anomaly and cluster row-count boundaries
//! 3. Pipelines are deterministic over a stored window
//! 4. A report pass on an empty store still writes every artifact

mod helpers;

use std::sync::Arc;

use chrono::Utc;
use hostlens_analytics::{
    cluster, detect_anomalies, forecast, AnomalyParams, ClusterParams, ForecastParams, Pipeline,
};
use hostlens_metrics::{load_window, load_window_at, seed_demo_if_needed, SampleStore, SeedConfig};
use hostlens_report::{ReportConfig, ReportGenerator, CHART_NAMES};
use helpers::*;
use test_case::test_case;

// ============================================================================
// Scenario A: seeding
// ============================================================================

#[test]
fn test_empty_store_is_seeded_with_full_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());

    let written = seed_demo_if_needed(store.as_ref(), &SeedConfig::default()).unwrap();

    assert_eq!(written, 180);
    assert_eq!(store.count().unwrap(), 180);
    // Seeded history spans 30 minutes and is all inside the default window.
    assert_eq!(load_window(store.as_ref(), 60.0).unwrap().len(), 180);
}

#[test]
fn test_seeding_a_populated_store_twice_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    fill(store.as_ref(), 60);

    assert_eq!(seed_demo_if_needed(store.as_ref(), &SeedConfig::default()).unwrap(), 0);
    assert_eq!(seed_demo_if_needed(store.as_ref(), &SeedConfig::default()).unwrap(), 0);
    assert_eq!(store.count().unwrap(), 60);
}

#[test]
fn test_seeded_history_feeds_every_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    seed_demo_if_needed(store.as_ref(), &SeedConfig::default().with_rng_seed(11)).unwrap();

    let window = load_window(store.as_ref(), 60.0).unwrap();
    assert!(forecast(&window, &ForecastParams::default()).unwrap().is_ready());
    assert!(detect_anomalies(&window, &AnomalyParams::default()).unwrap().is_ready());
    assert!(cluster(&window, &ClusterParams::default()).unwrap().is_ready());
}

// ============================================================================
// Scenario B: forecast boundaries
// ============================================================================

#[test_case(14, false ; "window of 14")]
#[test_case(15, false ; "window of 15")]
#[test_case(16, false ; "window of 16")]
#[test_case(19, false ; "fourteen lagged rows")]
#[test_case(20, true ; "fifteen lagged rows")]
#[test_case(21, true ; "sixteen lagged rows")]
fn test_forecast_boundary(rows: usize, ready: bool) {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    fill(store.as_ref(), rows);

    let window = load_window(store.as_ref(), 60.0).unwrap();
    assert_eq!(window.len(), rows);

    let outcome = forecast(&window, &ForecastParams::default().with_lags(5)).unwrap();
    assert_eq!(outcome.is_ready(), ready);
    if let Some(marker) = outcome.insufficient() {
        assert_eq!(marker.pipeline, Pipeline::Forecast);
        assert_eq!(marker.required, 15);
        assert_eq!(marker.available, rows.saturating_sub(5));
    }
}

#[test]
fn test_forecast_over_twenty_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    fill(store.as_ref(), 20);

    let window = load_window(store.as_ref(), 60.0).unwrap();
    let result = forecast(&window, &ForecastParams::default()).unwrap().ready().unwrap();

    assert_eq!(result.n_samples, 15);
    assert_eq!(result.n_train, 12);
    assert_eq!(result.actual.len(), 3);
    assert_eq!(result.predicted.len(), 3);
    assert!(result.mae.is_finite());
}

// ============================================================================
// Scenario C: anomaly boundary
// ============================================================================

#[test_case(29, false ; "one short")]
#[test_case(30, true ; "at minimum")]
fn test_anomaly_boundary(rows: usize, ready: bool) {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    fill(store.as_ref(), rows);

    let window = load_window(store.as_ref(), 60.0).unwrap();
    let outcome = detect_anomalies(&window, &AnomalyParams::default()).unwrap();
    assert_eq!(outcome.is_ready(), ready);
}

// ============================================================================
// Scenario D: cluster boundary
// ============================================================================

#[test]
fn test_cluster_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let now = Utc::now();
    let rows = history(now, 30);

    store.upsert_batch(&rows[1..]).unwrap();
    let window = load_window_at(store.as_ref(), 60.0, now).unwrap();
    let outcome = cluster(&window, &ClusterParams::default().with_k(3)).unwrap();
    assert_eq!(outcome.insufficient().map(|m| (m.required, m.available)), Some((30, 29)));

    store.upsert(&rows[0]).unwrap();
    let window = load_window_at(store.as_ref(), 60.0, now).unwrap();
    let result = cluster(&window, &ClusterParams::default().with_k(3)).unwrap().ready().unwrap();
    assert_eq!(result.sizes.len(), 3);
    assert_eq!(result.sizes.values().sum::<usize>(), 30);
}

// ============================================================================
// Determinism and reporting
// ============================================================================

#[test]
fn test_pipelines_repeat_over_stored_window() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let now = Utc::now();
    store.upsert_batch(&history(now, 120)).unwrap();

    let first = load_window_at(store.as_ref(), 60.0, now).unwrap();
    let second = load_window_at(store.as_ref(), 60.0, now).unwrap();
    assert_eq!(first, second);

    let a = detect_anomalies(&first, &AnomalyParams::default()).unwrap();
    let b = detect_anomalies(&second, &AnomalyParams::default()).unwrap();
    assert_eq!(a, b);

    let a = cluster(&first, &ClusterParams::default()).unwrap();
    let b = cluster(&second, &ClusterParams::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_report_on_empty_store_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    let generator = ReportGenerator::new(Arc::clone(&store), ReportConfig::new(dir.path().join("report")));

    let summary = generator.generate().unwrap();

    assert_eq!(summary.sample_count, 0);
    assert!(summary.forecast.is_insufficient());
    assert!(summary.anomaly.is_insufficient());
    assert!(summary.clusters.is_insufficient());
    assert_eq!(summary.charts.len(), CHART_NAMES.len());
    for chart in &summary.charts {
        assert!(chart.exists(), "missing {}", chart.display());
    }
    assert!(summary.index.exists());
}

#[test]
fn test_report_on_seeded_store_is_fully_ready() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(dir.path());
    seed_demo_if_needed(store.as_ref(), &SeedConfig::default().with_rng_seed(5)).unwrap();
    let generator = ReportGenerator::new(Arc::clone(&store), ReportConfig::new(dir.path().join("report")));

    let summary = generator.generate().unwrap();

    assert_eq!(summary.sample_count, 180);
    assert!(summary.forecast.is_ready());
    assert!(summary.anomaly.is_ready());
    assert!(summary.clusters.is_ready());
    let html = std::fs::read_to_string(&summary.index).unwrap();
    for name in CHART_NAMES {
        assert!(html.contains(&format!("img/{name}.svg")));
    }
}
