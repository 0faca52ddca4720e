//! One report pass: load a window, run every pipeline, render, assemble.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hostlens_analytics::{
    cluster, detect_anomalies, forecast, AnomalyParams, AnomalyResult, ClusterParams,
    ClusterResult, ForecastParams, ForecastResult, Outcome,
};
use hostlens_metrics::{load_window_at, SampleStore, Window};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::chart::{ChartRenderer, ChartSpec, Series, SvgChartRenderer, PALETTE};
use crate::error::Result;
use crate::html::{Figure, HtmlReport};

/// File name of the assembled report.
pub const INDEX_FILE: &str = "index.html";

/// Subdirectory of the output directory holding chart images.
pub const IMAGE_DIR: &str = "img";

/// Charts produced by every pass, in report order.
pub const CHART_NAMES: [&str; 5] = ["cpu_mem", "loads", "forecast", "anomaly", "clusters"];

/// Lookback used by report passes when the configured one is a minute or less.
pub const FALLBACK_WINDOW_MINUTES: f64 = 60.0;

/// Report generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    /// Directory receiving `index.html` and `img/`.
    pub output_dir: PathBuf,
    /// Lookback of the window analysed by each pass.
    pub window_minutes: f64,
    /// Sampler interval, shown in the report header.
    pub sample_interval_secs: f64,
    /// Store location, shown in the report header.
    pub store_label: String,
    /// Forecast parameters.
    pub forecast: ForecastParams,
    /// Anomaly parameters.
    pub anomaly: AnomalyParams,
    /// Cluster parameters.
    pub cluster: ClusterParams,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("report"),
            window_minutes: 60.0,
            sample_interval_secs: 5.0,
            store_label: "data/metrics.db".to_string(),
            forecast: ForecastParams::default(),
            anomaly: AnomalyParams::default(),
            cluster: ClusterParams::default(),
        }
    }
}

impl ReportConfig {
    /// Creates a config writing to `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the window lookback.
    #[must_use]
    pub const fn with_window_minutes(mut self, minutes: f64) -> Self {
        self.window_minutes = minutes;
        self
    }

    /// Lookback a pass actually analyses: the configured one, or
    /// [`FALLBACK_WINDOW_MINUTES`] when that is a minute or less.
    #[must_use]
    pub fn pass_window_minutes(&self) -> f64 {
        if self.window_minutes > 1.0 {
            self.window_minutes
        } else {
            FALLBACK_WINDOW_MINUTES
        }
    }

    /// Sets the sampler interval shown in the header.
    #[must_use]
    pub const fn with_sample_interval_secs(mut self, secs: f64) -> Self {
        self.sample_interval_secs = secs;
        self
    }

    /// Sets the store label shown in the header.
    #[must_use]
    pub fn with_store_label(mut self, label: impl Into<String>) -> Self {
        self.store_label = label.into();
        self
    }
}

/// Forecast metrics as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDigest {
    /// Lag count used.
    pub lags: usize,
    /// Lagged rows.
    pub n_samples: usize,
    /// Held-out mean absolute error.
    pub mae: f64,
    /// Held-out R²; `None` when undefined.
    pub r2: Option<f64>,
}

impl From<&ForecastResult> for ForecastDigest {
    fn from(result: &ForecastResult) -> Self {
        Self {
            lags: result.lags,
            n_samples: result.n_samples,
            mae: result.mae,
            r2: result.r2.is_finite().then_some(result.r2),
        }
    }
}

/// Anomaly metrics as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyDigest {
    /// Contamination used.
    pub contamination: f64,
    /// Fraction of rows flagged.
    pub anomaly_rate: f64,
    /// Rows flagged.
    pub anomalies: usize,
}

impl From<&AnomalyResult> for AnomalyDigest {
    fn from(result: &AnomalyResult) -> Self {
        Self {
            contamination: result.contamination,
            anomaly_rate: result.anomaly_rate,
            anomalies: result.anomaly_count(),
        }
    }
}

/// Cluster metrics as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDigest {
    /// Cluster count.
    pub k: usize,
    /// Members per cluster id.
    pub sizes: BTreeMap<usize, usize>,
}

impl From<&ClusterResult> for ClusterDigest {
    fn from(result: &ClusterResult) -> Self {
        Self {
            k: result.k,
            sizes: result.sizes.clone(),
        }
    }
}

/// What a report pass produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Reference instant of the pass.
    pub generated_at: DateTime<Utc>,
    /// Lookback used.
    pub window_minutes: f64,
    /// Rows in the analysed window.
    pub sample_count: usize,
    /// Forecast outcome.
    pub forecast: Outcome<ForecastDigest>,
    /// Anomaly outcome.
    pub anomaly: Outcome<AnomalyDigest>,
    /// Cluster outcome.
    pub clusters: Outcome<ClusterDigest>,
    /// Chart files written, in [`CHART_NAMES`] order.
    pub charts: Vec<PathBuf>,
    /// The assembled document.
    pub index: PathBuf,
}

/// Runs report passes against a shared store.
///
/// Passes are serialized so a timer-driven pass and an on-demand pass never
/// write the same files at once. The store itself is only touched for the
/// window query.
#[derive(Debug)]
pub struct ReportGenerator {
    store: Arc<dyn SampleStore>,
    renderer: Arc<dyn ChartRenderer>,
    config: ReportConfig,
    pass_lock: Mutex<()>,
}

impl ReportGenerator {
    /// Creates a generator rendering SVG charts.
    #[must_use]
    pub fn new(store: Arc<dyn SampleStore>, config: ReportConfig) -> Self {
        Self {
            store,
            renderer: Arc::new(SvgChartRenderer::default()),
            config,
            pass_lock: Mutex::new(()),
        }
    }

    /// Replaces the chart renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// The generator's settings.
    #[must_use]
    pub const fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Path of the assembled report.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.config.output_dir.join(INDEX_FILE)
    }

    /// Directory holding chart images.
    #[must_use]
    pub fn image_dir(&self) -> PathBuf {
        self.config.output_dir.join(IMAGE_DIR)
    }

    /// File name of a chart, e.g. `cpu_mem.svg`.
    #[must_use]
    pub fn chart_file_name(&self, chart: &str) -> String {
        format!("{chart}.{}", self.renderer.extension())
    }

    /// Runs one pass ending now.
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be loaded, a pipeline rejects its
    /// parameters or an artifact cannot be written. Insufficient data is not
    /// an error.
    pub fn generate(&self) -> Result<ReportSummary> {
        self.generate_at(Utc::now())
    }

    /// Runs one pass with `now` as the window's reference instant.
    ///
    /// # Errors
    ///
    /// See [`ReportGenerator::generate`].
    pub fn generate_at(&self, now: DateTime<Utc>) -> Result<ReportSummary> {
        let window_minutes = self.config.pass_window_minutes();
        let window = load_window_at(self.store.as_ref(), window_minutes, now)?;
        let _pass = self.pass_lock.lock();

        let fc = forecast(&window, &self.config.forecast)?;
        let an = detect_anomalies(&window, &self.config.anomaly)?;
        let cl = cluster(&window, &self.config.cluster)?;

        let specs = [
            cpu_mem_chart(&window, now),
            loads_chart(&window, now),
            forecast_chart(&fc),
            anomaly_chart(&window, now, &an),
            clusters_chart(&window, &cl),
        ];

        let image_dir = self.image_dir();
        let mut charts = Vec::with_capacity(CHART_NAMES.len());
        for (name, spec) in CHART_NAMES.iter().zip(&specs) {
            let path = image_dir.join(self.chart_file_name(name));
            self.renderer.render(spec, &path)?;
            charts.push(path);
        }

        let summary = ReportSummary {
            generated_at: now,
            window_minutes,
            sample_count: window.len(),
            forecast: as_digest(&fc),
            anomaly: as_digest(&an),
            clusters: as_digest(&cl),
            charts,
            index: self.index_path(),
        };

        self.assemble(&summary).write(&summary.index)?;

        info!(
            samples = summary.sample_count,
            forecast = summary.forecast.is_ready(),
            anomaly = summary.anomaly.is_ready(),
            clusters = summary.clusters.is_ready(),
            index = %summary.index.display(),
            "report generated"
        );
        Ok(summary)
    }

    fn assemble(&self, summary: &ReportSummary) -> HtmlReport {
        let headings = [
            "CPU and memory (%)",
            "Load averages (1m/5m/15m)",
            "CPU forecast (linear regression)",
            "Anomalies (isolation forest)",
            "Clusters (k-means)",
        ];
        let captions = [
            format!("{} samples in the last {:.1} min", summary.sample_count, summary.window_minutes),
            String::new(),
            forecast_caption(&summary.forecast),
            anomaly_caption(&summary.anomaly),
            cluster_caption(&summary.clusters),
        ];

        let mut report = HtmlReport::new("hostlens report", summary.generated_at)
            .with_meta("Interval", format!("{:.1}s", self.config.sample_interval_secs))
            .with_meta("Window", format!("{:.1} min", summary.window_minutes))
            .with_meta("Store", self.config.store_label.clone());
        for ((heading, caption), path) in headings.iter().zip(captions).zip(&summary.charts) {
            report = report.with_figure(Figure {
                heading: (*heading).to_string(),
                src: relative_image_src(path),
                caption,
            });
        }
        report
    }
}

fn relative_image_src(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{IMAGE_DIR}/{file}")
}

fn as_digest<'a, T, D>(outcome: &'a Outcome<T>) -> Outcome<D>
where
    D: From<&'a T>,
{
    match outcome {
        Outcome::Ready(result) => Outcome::Ready(D::from(result)),
        Outcome::Insufficient(marker) => Outcome::Insufficient(*marker),
    }
}

/// Minutes relative to `now`; negative for the past.
fn minutes_before(ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (ts - now).num_milliseconds() as f64 / 60_000.0
}

const TIME_AXIS: &str = "minutes (relative to now)";

fn cpu_mem_chart(window: &Window, now: DateTime<Utc>) -> ChartSpec {
    let cpu = window
        .samples()
        .iter()
        .map(|s| (minutes_before(s.timestamp, now), s.cpu_percent))
        .collect();
    let mem = window
        .samples()
        .iter()
        .map(|s| (minutes_before(s.timestamp, now), s.mem_percent))
        .collect();
    ChartSpec::new("CPU and memory (%)")
        .with_axes(TIME_AXIS, "%")
        .with_series(Series::line("CPU %", cpu, PALETTE[0]))
        .with_series(Series::line("Mem %", mem, PALETTE[1]))
}

fn loads_chart(window: &Window, now: DateTime<Utc>) -> ChartSpec {
    let series = |f: fn(&hostlens_metrics::Sample) -> f64| {
        window
            .samples()
            .iter()
            .map(|s| (minutes_before(s.timestamp, now), f(s)))
            .collect::<Vec<_>>()
    };
    ChartSpec::new("Load averages")
        .with_axes(TIME_AXIS, "load")
        .with_series(Series::line("load_1m", series(|s| s.load_1m), PALETTE[0]))
        .with_series(Series::line("load_5m", series(|s| s.load_5m), PALETTE[1]))
        .with_series(Series::line("load_15m", series(|s| s.load_15m), PALETTE[2]))
}

fn forecast_chart(outcome: &Outcome<ForecastResult>) -> ChartSpec {
    let base = ChartSpec::new("CPU forecast").with_axes("held-out row", "CPU %");
    let Some(result) = outcome.as_ready() else {
        return base;
    };
    let indexed = |values: &[f64]| {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64, *v))
            .collect::<Vec<_>>()
    };
    ChartSpec {
        title: format!(
            "CPU forecast: MAE={:.2} | R2={}",
            result.mae,
            format_r2(result.r2)
        ),
        ..base
    }
    .with_series(Series::line("actual (test)", indexed(&result.actual), PALETTE[0]))
    .with_series(Series::line("predicted", indexed(&result.predicted), PALETTE[1]))
}

fn anomaly_chart(window: &Window, now: DateTime<Utc>, outcome: &Outcome<AnomalyResult>) -> ChartSpec {
    let base = ChartSpec::new("Anomaly detection").with_axes(TIME_AXIS, "CPU %");
    let Some(result) = outcome.as_ready() else {
        return base;
    };
    let cpu: Vec<(f64, f64)> = window
        .samples()
        .iter()
        .map(|s| (minutes_before(s.timestamp, now), s.cpu_percent))
        .collect();
    let flagged = cpu
        .iter()
        .zip(&result.labels)
        .filter(|(_, anomalous)| **anomalous)
        .map(|(point, _)| *point)
        .collect();
    ChartSpec {
        title: format!("Anomaly detection (rate={:.2}%)", result.anomaly_rate * 100.0),
        ..base
    }
    .with_series(Series::line("CPU %", cpu, PALETTE[0]))
    .with_series(Series::crosses("anomaly", flagged, PALETTE[3]))
}

fn clusters_chart(window: &Window, outcome: &Outcome<ClusterResult>) -> ChartSpec {
    let base = ChartSpec::new("Clusters").with_axes("CPU %", "Mem %");
    let Some(result) = outcome.as_ready() else {
        return base;
    };
    let mut spec = ChartSpec {
        title: format!("Clusters (k={}): sizes {}", result.k, format_sizes(&result.sizes)),
        ..base
    };
    for id in 0..result.k {
        let points = window
            .samples()
            .iter()
            .zip(&result.assignments)
            .filter(|(_, assigned)| **assigned == id)
            .map(|(s, _)| (s.cpu_percent, s.mem_percent))
            .collect();
        spec = spec.with_series(Series::points(
            format!("cluster {id}"),
            points,
            PALETTE[id % PALETTE.len()],
        ));
    }
    debug!(k = result.k, "built cluster chart");
    spec
}

fn format_r2(r2: f64) -> String {
    if r2.is_finite() {
        format!("{r2:.2}")
    } else {
        "n/a".to_string()
    }
}

fn format_sizes(sizes: &BTreeMap<usize, usize>) -> String {
    let parts: Vec<String> = sizes.iter().map(|(id, n)| format!("{id}: {n}")).collect();
    format!("{{{}}}", parts.join(", "))
}

fn forecast_caption(outcome: &Outcome<ForecastDigest>) -> String {
    match outcome {
        Outcome::Ready(d) => format!(
            "MAE={:.2} | R2={} | {} lagged rows, {} lags",
            d.mae,
            d.r2.map_or_else(|| "n/a".to_string(), |r| format!("{r:.2}")),
            d.n_samples,
            d.lags
        ),
        Outcome::Insufficient(marker) => marker.to_string(),
    }
}

fn anomaly_caption(outcome: &Outcome<AnomalyDigest>) -> String {
    match outcome {
        Outcome::Ready(d) => format!(
            "{} rows flagged, rate {:.2}% (contamination {})",
            d.anomalies,
            d.anomaly_rate * 100.0,
            d.contamination
        ),
        Outcome::Insufficient(marker) => marker.to_string(),
    }
}

fn cluster_caption(outcome: &Outcome<ClusterDigest>) -> String {
    match outcome {
        Outcome::Ready(d) => format!("k={}, sizes {}", d.k, format_sizes(&d.sizes)),
        Outcome::Insufficient(marker) => marker.to_string(),
    }
}
