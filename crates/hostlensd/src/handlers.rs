//! HTTP request handlers.
//!
//! Every analytics request loads a fresh window and refits on the blocking
//! pool; nothing is cached between requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use hostlens_analytics::{
    cluster, detect_anomalies, forecast, AnomalyParams, ClusterParams, ForecastParams, Outcome,
};
use hostlens_metrics::{format_timestamp, load_window, Sample};
use hostlens_report::chart::escape_markup;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DaemonError, DaemonResult};
use crate::startup::StartupPhase;
use crate::state::{run_blocking, AppState};

/// Rows returned by `/metrics`.
pub const LATEST_ROWS: usize = 12;

/// Application name reported by `/about`.
pub const APP_NAME: &str = "hostlens";

/// Query parameters for `/ai/forecast`.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    /// Lookback in minutes.
    pub window_minutes: Option<f64>,
    /// Number of lag features.
    pub lags: Option<usize>,
}

/// Query parameters for `/ai/anomaly`.
#[derive(Debug, Default, Deserialize)]
pub struct AnomalyQuery {
    /// Lookback in minutes.
    pub window_minutes: Option<f64>,
    /// Expected outlier share.
    pub contamination: Option<f64>,
}

/// Query parameters for `/ai/clusters`.
#[derive(Debug, Default, Deserialize)]
pub struct ClusterQuery {
    /// Lookback in minutes.
    pub window_minutes: Option<f64>,
    /// Number of clusters.
    pub k: Option<usize>,
}

/// Response for `/about`.
#[derive(Debug, Serialize)]
pub struct AboutResponse {
    /// Application name.
    pub app: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Sampling period in seconds.
    pub interval_sec: f64,
    /// Store location.
    pub db_path: String,
    /// Default lookback in minutes.
    pub window_minutes_default: f64,
    /// Report output directory.
    pub report_dir: String,
    /// Startup gate phase.
    pub startup: StartupPhase,
    /// Seconds since the daemon started.
    pub uptime_secs: i64,
}

/// One stored row as returned by `/metrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRow {
    /// Store key (RFC 3339, microseconds, `Z`).
    pub ts: String,
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

impl From<&Sample> for SampleRow {
    fn from(sample: &Sample) -> Self {
        Self {
            ts: format_timestamp(sample.timestamp),
            cpu_percent: sample.cpu_percent,
            mem_percent: sample.mem_percent,
            load_1m: sample.load_1m,
            load_5m: sample.load_5m,
            load_15m: sample.load_15m,
        }
    }
}

/// Response for `/metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    /// Most recent rows of the default window, ascending.
    pub samples: Vec<SampleRow>,
    /// Sampling period in seconds.
    pub interval_sec: f64,
}

/// Fit quality of a forecast.
#[derive(Debug, Serialize)]
pub struct ForecastMetrics {
    /// Mean absolute error on the test split.
    #[serde(rename = "MAE")]
    pub mae: f64,
    /// Coefficient of determination; `null` when undefined.
    #[serde(rename = "R2")]
    pub r2: Option<f64>,
}

/// Response for `/ai/forecast`.
#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    /// Lookback used.
    pub window_minutes: f64,
    /// Lag features used.
    pub lags: usize,
    /// Lagged rows the model saw.
    pub n_samples: usize,
    /// Fit quality.
    pub metrics: ForecastMetrics,
}

/// Response for `/ai/anomaly`.
#[derive(Debug, Serialize)]
pub struct AnomalyResponse {
    /// Lookback used.
    pub window_minutes: f64,
    /// Contamination used.
    pub contamination: f64,
    /// Share of rows labeled anomalous.
    pub anom_rate: f64,
    /// Rows labeled anomalous.
    pub anomalies: usize,
}

/// Response for `/ai/clusters`.
#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    /// Lookback used.
    pub window_minutes: f64,
    /// Clusters requested.
    pub k: usize,
    /// Members per cluster id.
    pub cluster_sizes: BTreeMap<usize, usize>,
}

/// Response for `/snapshot`.
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    /// Always `true`; failures are reported as errors.
    pub ok: bool,
    /// Reference instant of the pass.
    pub generated_at: DateTime<Utc>,
    /// Rows in the analysed window.
    pub sample_count: usize,
}

fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> DaemonResult<T> {
    query
        .map(|Query(q)| q)
        .map_err(|e| DaemonError::InvalidRequest(e.body_text()))
}

fn require<T>(outcome: Outcome<T>) -> DaemonResult<T> {
    match outcome {
        Outcome::Ready(value) => Ok(value),
        Outcome::Insufficient(marker) => Err(marker.into()),
    }
}

/// Handle GET /healthz.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Handle GET /about.
pub async fn about(State(state): State<Arc<AppState>>) -> Json<AboutResponse> {
    let config = state.config();
    Json(AboutResponse {
        app: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
        interval_sec: config.interval_secs(),
        db_path: config.store_label(),
        window_minutes_default: config.window_minutes,
        report_dir: config.report_dir.display().to_string(),
        startup: state.startup_phase(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Handle GET /metrics - latest rows of the default window.
pub async fn metrics(State(state): State<Arc<AppState>>) -> DaemonResult<Json<MetricsResponse>> {
    let store = state.store();
    let minutes = state.config().window_minutes;
    let samples: Vec<SampleRow> = run_blocking(move || {
        let window = load_window(store.as_ref(), minutes)?;
        Ok(window.tail(LATEST_ROWS).iter().map(SampleRow::from).collect())
    })
    .await?;

    Ok(Json(MetricsResponse {
        samples,
        interval_sec: state.config().interval_secs(),
    }))
}

/// Handle GET /ai/forecast.
pub async fn ai_forecast(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> DaemonResult<Json<ForecastResponse>> {
    let query = parse_query(query)?;
    let window_minutes = query.window_minutes.unwrap_or(state.config().window_minutes);
    let params = ForecastParams::default().with_lags(query.lags.unwrap_or(ForecastParams::DEFAULT_LAGS));

    let store = state.store();
    let outcome = run_blocking(move || {
        let window = load_window(store.as_ref(), window_minutes)?;
        Ok(forecast(&window, &params)?)
    })
    .await?;
    let result = require(outcome)?;
    debug!(window_minutes, lags = result.lags, mae = result.mae, "served forecast");

    Ok(Json(ForecastResponse {
        window_minutes,
        lags: result.lags,
        n_samples: result.n_samples,
        metrics: ForecastMetrics {
            mae: result.mae,
            r2: result.r2.is_finite().then_some(result.r2),
        },
    }))
}

/// Handle GET /ai/anomaly.
pub async fn ai_anomaly(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AnomalyQuery>, QueryRejection>,
) -> DaemonResult<Json<AnomalyResponse>> {
    let query = parse_query(query)?;
    let window_minutes = query.window_minutes.unwrap_or(state.config().window_minutes);
    let params = AnomalyParams::default()
        .with_contamination(query.contamination.unwrap_or(AnomalyParams::DEFAULT_CONTAMINATION));

    let store = state.store();
    let outcome = run_blocking(move || {
        let window = load_window(store.as_ref(), window_minutes)?;
        Ok(detect_anomalies(&window, &params)?)
    })
    .await?;
    let result = require(outcome)?;

    Ok(Json(AnomalyResponse {
        window_minutes,
        contamination: result.contamination,
        anom_rate: result.anomaly_rate,
        anomalies: result.anomaly_count(),
    }))
}

/// Handle GET /ai/clusters.
pub async fn ai_clusters(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ClusterQuery>, QueryRejection>,
) -> DaemonResult<Json<ClusterResponse>> {
    let query = parse_query(query)?;
    let window_minutes = query.window_minutes.unwrap_or(state.config().window_minutes);
    let params = ClusterParams::default().with_k(query.k.unwrap_or(ClusterParams::DEFAULT_K));

    let store = state.store();
    let outcome = run_blocking(move || {
        let window = load_window(store.as_ref(), window_minutes)?;
        Ok(cluster(&window, &params)?)
    })
    .await?;
    let result = require(outcome)?;

    Ok(Json(ClusterResponse {
        window_minutes,
        k: result.k,
        cluster_sizes: result.sizes,
    }))
}

/// Handle GET/POST /snapshot - regenerate the report now.
pub async fn snapshot(State(state): State<Arc<AppState>>) -> DaemonResult<Json<SnapshotResponse>> {
    let reports = state.reports();
    let summary = run_blocking(move || Ok(reports.generate()?)).await?;

    Ok(Json(SnapshotResponse {
        ok: true,
        generated_at: summary.generated_at,
        sample_count: summary.sample_count,
    }))
}

/// Handle GET /report/html.
pub async fn report_html(State(state): State<Arc<AppState>>) -> DaemonResult<Html<String>> {
    let path = state.reports().index_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DaemonError::NotFound(
            "report".to_string(),
            path.display().to_string(),
        )),
        Err(e) => Err(DaemonError::Internal(e.to_string())),
    }
}

/// Chart file names are flat: no separators, no leading dot.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\']) && !name.contains("..")
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).as_deref() {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Handle GET /report/img/{name}.
pub async fn report_img(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> DaemonResult<Response> {
    if !is_plain_file_name(&name) {
        return Err(DaemonError::NotFound("chart".to_string(), name));
    }
    let path = state.reports().image_dir().join(&name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type_for(&name))], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DaemonError::NotFound("chart".to_string(), name))
        }
        Err(e) => Err(DaemonError::Internal(e.to_string())),
    }
}

/// Handle GET /dashboard - a small landing page.
pub async fn dashboard(State(state): State<Arc<AppState>>) -> DaemonResult<Html<String>> {
    let store = state.store();
    let minutes = state.config().window_minutes;
    let (count, last) = run_blocking(move || {
        let window = load_window(store.as_ref(), minutes)?;
        Ok((window.len(), window.tail(1).first().map(SampleRow::from)))
    })
    .await?;

    let last = match last {
        Some(row) => format!(
            "{} cpu {:.1}% mem {:.1}% load {:.2}/{:.2}/{:.2}",
            row.ts, row.cpu_percent, row.mem_percent, row.load_1m, row.load_5m, row.load_15m
        ),
        None => "none".to_string(),
    };
    let links: String = [
        "/report/html",
        "/metrics",
        "/ai/forecast",
        "/ai/anomaly",
        "/ai/clusters",
        "/about",
        "/healthz",
    ]
    .iter()
    .map(|route| format!("  <li><a href=\"{route}\">{route}</a></li>\n"))
    .collect();

    Ok(Html(format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>{APP_NAME}</title></head><body>\n\
         <h1>{APP_NAME} {version}</h1>\n\
         <p><b>Interval:</b> {interval}s | <b>Default window:</b> {minutes} min | <b>Samples:</b> {count}</p>\n\
         <p><b>Last sample:</b> {last}</p>\n\
         <h2>Links</h2>\n<ul>\n{links}</ul>\n</body></html>\n",
        version = env!("CARGO_PKG_VERSION"),
        interval = state.config().interval_secs(),
        last = escape_markup(&last),
    )))
}
