//! # hostlens-report
//!
//! Static report generation for hostlens.
//!
//! A pass loads one window, runs the forecast, anomaly and cluster pipelines,
//! renders five SVG charts and writes an `index.html` that links them. Passes
//! never fail for lack of data: pipelines that decline get a placeholder
//! chart and an explanatory caption.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hostlens_metrics::MemorySampleStore;
//! use hostlens_report::{ReportConfig, ReportGenerator};
//!
//! let store = Arc::new(MemorySampleStore::new());
//! let generator = ReportGenerator::new(store, ReportConfig::new("report"));
//! let summary = generator.generate().unwrap();
//! println!("wrote {}", summary.index.display());
//! ```

pub mod chart;
pub mod error;
pub mod generator;
pub mod html;

pub use chart::{ChartRenderer, ChartSpec, Series, SeriesStyle, SvgChartRenderer};
pub use error::{ReportError, Result};
pub use generator::{
    AnomalyDigest, ClusterDigest, ForecastDigest, ReportConfig, ReportGenerator, ReportSummary,
    CHART_NAMES, FALLBACK_WINDOW_MINUTES, IMAGE_DIR, INDEX_FILE,
};
pub use html::{Figure, HtmlReport};
