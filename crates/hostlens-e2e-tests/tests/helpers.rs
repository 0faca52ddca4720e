//! Test helpers for E2E tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use hostlens_metrics::{LoadAverages, Sample, SampleStore, SqliteSampleStore, StaticSource};
use hostlensd::{AppState, DaemonConfig, DaemonServer};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tower::ServiceExt;

/// Default test timeout.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens a fresh SQLite store inside `dir`.
pub fn sqlite_store(dir: &Path) -> Arc<dyn SampleStore> {
    Arc::new(SqliteSampleStore::open(&dir.join("metrics.db")).unwrap())
}

/// `rows` varied samples spaced 10 s apart, the last one 10 s before `now`.
pub fn history(now: DateTime<Utc>, rows: usize) -> Vec<Sample> {
    (0..rows)
        .map(|i| {
            let t = i as f64;
            Sample::new(
                now - chrono::Duration::seconds(10 * (rows - i) as i64),
                30.0 + 8.0 * (t / 3.0).sin() + 2.0 * (t * 1.3).cos(),
                50.0 + 4.0 * (t / 7.0).cos(),
                LoadAverages::new(0.3 + 0.1 * (t / 5.0).sin(), 0.25, 0.2 + 0.005 * t),
            )
        })
        .collect()
}

/// Writes [`history`] ending at the current instant.
pub fn fill(store: &dyn SampleStore, rows: usize) {
    store.upsert_batch(&history(Utc::now(), rows)).unwrap();
}

/// Daemon pieces wired the way the binary wires them, on a SQLite file and
/// with a startup gate of their own.
pub struct TestDaemon {
    pub state: Arc<AppState>,
    pub store: Arc<dyn SampleStore>,
    pub dir: TempDir,
}

impl TestDaemon {
    /// Builds a daemon with long loop periods so background ticks do not
    /// disturb row counts.
    pub fn new(demo_seed: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_db_path(dir.path().join("metrics.db"))
            .with_report_dir(dir.path().join("report"))
            .with_demo_seed(demo_seed)
            .with_sample_interval(Duration::from_secs(3600))
            .with_report_interval(Duration::from_secs(3600));
        let store = sqlite_store(dir.path());
        let source = Arc::new(StaticSource::new(25.0, 50.0, Some(LoadAverages::new(0.4, 0.3, 0.2))));
        let state = Arc::new(
            AppState::new(config, Arc::clone(&store), source).with_startup_gate(Arc::default()),
        );
        Self { state, store, dir }
    }

    /// Router over the shared state.
    pub fn router(&self) -> Router {
        DaemonServer::new(Arc::clone(&self.state)).router()
    }
}

/// Sends a GET through the router and decodes the JSON body.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Minimal HTTP/1.1 GET over a real socket; returns the raw response.
pub async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = timeout(TEST_TIMEOUT, TcpStream::connect(addr)).await.unwrap().unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    timeout(TEST_TIMEOUT, stream.read_to_string(&mut response)).await.unwrap().unwrap();
    response
}

/// Polls `done` until it holds or the test timeout passes.
pub async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    done()
}
