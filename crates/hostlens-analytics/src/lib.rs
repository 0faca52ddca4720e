//! # hostlens-analytics
//!
//! Analytics pipelines over a window of host samples.
//!
//! Each pipeline retrains from scratch on every call and either returns a
//! result or reports that the window is too small:
//!
//! - **Forecast**: lagged OLS prediction of CPU utilization with a temporal
//!   80/20 hold-out (MAE and R²)
//! - **Anomaly**: seeded isolation forest over the raw five-feature vector
//! - **Cluster**: seeded k-means over z-score standardized features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use hostlens_analytics::{cluster, detect_anomalies, forecast, AnomalyParams, ClusterParams, ForecastParams};
//! use hostlens_metrics::{LoadAverages, Sample, Window};
//!
//! let now = Utc::now();
//! let samples: Vec<Sample> = (0..12)
//!     .map(|i| Sample::new(now - Duration::seconds(120 - i * 10), 20.0, 30.0, LoadAverages::default()))
//!     .collect();
//! let window = Window::new(now - Duration::minutes(5), now, samples);
//!
//! // Twelve rows are too few for any pipeline; that is a result, not an error.
//! assert!(forecast(&window, &ForecastParams::default()).unwrap().is_insufficient());
//! assert!(detect_anomalies(&window, &AnomalyParams::default()).unwrap().is_insufficient());
//! assert!(cluster(&window, &ClusterParams::default()).unwrap().is_insufficient());
//! ```

pub mod anomaly;
pub mod cluster;
pub mod error;
pub mod forecast;
pub mod stats;
pub mod types;

pub use anomaly::{detect_anomalies, IsolationForest};
pub use cluster::{cluster, KMeans};
pub use error::{AnalyticsError, Result};
pub use forecast::forecast;
pub use stats::LinearModel;
pub use types::{
    AnomalyParams, AnomalyResult, ClusterParams, ClusterResult, ForecastParams, ForecastResult,
    InsufficientData, Outcome, Pipeline,
};
