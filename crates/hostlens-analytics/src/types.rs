//! Pipeline parameters, results and the insufficient-data outcome.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// Identifies an analytics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Lagged OLS forecast of CPU utilization.
    Forecast,
    /// Isolation-forest outlier labeling.
    Anomaly,
    /// K-means workload clustering.
    Cluster,
}

impl Pipeline {
    /// Returns the lowercase pipeline name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forecast => "forecast",
            Self::Anomaly => "anomaly",
            Self::Cluster => "cluster",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline's minimum-row precondition was not met.
///
/// `required` and `available` count the rows the guard inspects: lagged rows
/// for the forecast, window rows for the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientData {
    /// Pipeline that declined to run.
    pub pipeline: Pipeline,
    /// Rows needed.
    pub required: usize,
    /// Rows present.
    pub available: usize,
}

impl InsufficientData {
    /// Creates an insufficient-data marker.
    #[must_use]
    pub const fn new(pipeline: Pipeline, required: usize, available: usize) -> Self {
        Self {
            pipeline,
            required,
            available,
        }
    }
}

impl fmt::Display for InsufficientData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insufficient data for {}: need {} rows, have {}",
            self.pipeline, self.required, self.available
        )
    }
}

/// Result of a pipeline run that passed parameter validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The model was fitted.
    Ready(T),
    /// Not enough history; nothing was fitted.
    Insufficient(InsufficientData),
}

impl<T> Outcome<T> {
    /// Returns true if the pipeline produced a result.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Returns true if the pipeline declined for lack of data.
    #[must_use]
    pub const fn is_insufficient(&self) -> bool {
        matches!(self, Self::Insufficient(_))
    }

    /// Returns the result, if any.
    #[must_use]
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Insufficient(_) => None,
        }
    }

    /// Borrows the result, if any.
    #[must_use]
    pub const fn as_ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Insufficient(_) => None,
        }
    }

    /// Returns the insufficient-data marker, if any.
    #[must_use]
    pub const fn insufficient(&self) -> Option<&InsufficientData> {
        match self {
            Self::Ready(_) => None,
            Self::Insufficient(marker) => Some(marker),
        }
    }

    /// Maps the ready value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ready(value) => Outcome::Ready(f(value)),
            Self::Insufficient(marker) => Outcome::Insufficient(marker),
        }
    }
}

/// Forecast parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastParams {
    /// Number of lagged CPU values used as predictors.
    pub lags: usize,
}

impl ForecastParams {
    /// Default lag count.
    pub const DEFAULT_LAGS: usize = 5;

    /// Sets the lag count.
    #[must_use]
    pub const fn with_lags(mut self, lags: usize) -> Self {
        self.lags = lags;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `lags` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.lags == 0 {
            return Err(AnalyticsError::invalid("lags", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            lags: Self::DEFAULT_LAGS,
        }
    }
}

/// Anomaly detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyParams {
    /// Expected fraction of outliers, in `(0, 0.5]`.
    pub contamination: f64,
}

impl AnomalyParams {
    /// Default contamination.
    pub const DEFAULT_CONTAMINATION: f64 = 0.03;

    /// Sets the contamination.
    #[must_use]
    pub const fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if contamination is outside `(0, 0.5]`.
    pub fn validate(&self) -> Result<()> {
        let c = self.contamination;
        if !(c > 0.0 && c <= 0.5) {
            return Err(AnalyticsError::invalid(
                "contamination",
                format!("must be in (0, 0.5], got {c}"),
            ));
        }
        Ok(())
    }
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            contamination: Self::DEFAULT_CONTAMINATION,
        }
    }
}

/// Clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Number of clusters.
    pub k: usize,
}

impl ClusterParams {
    /// Default cluster count.
    pub const DEFAULT_K: usize = 3;

    /// Sets the cluster count.
    #[must_use]
    pub const fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `k` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(AnalyticsError::invalid("k", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            k: Self::DEFAULT_K,
        }
    }
}

/// Held-out evaluation of the CPU forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Lag count used.
    pub lags: usize,
    /// Rows remaining after dropping undefined lags.
    pub n_samples: usize,
    /// Rows used to fit the model.
    pub n_train: usize,
    /// Timestamps of the held-out rows.
    pub timestamps: Vec<DateTime<Utc>>,
    /// Held-out CPU values.
    pub actual: Vec<f64>,
    /// Predictions for the held-out rows.
    pub predicted: Vec<f64>,
    /// Mean absolute error on the held-out rows.
    pub mae: f64,
    /// Coefficient of determination; NaN when the held-out targets are constant.
    pub r2: f64,
}

/// Per-row outlier labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Contamination used.
    pub contamination: f64,
    /// `true` for rows labeled anomalous, parallel to the window.
    pub labels: Vec<bool>,
    /// Isolation score per row, in `(0, 1]`; higher is more anomalous.
    pub scores: Vec<f64>,
    /// Fraction of rows labeled anomalous.
    pub anomaly_rate: f64,
}

impl AnomalyResult {
    /// Number of rows labeled anomalous.
    #[must_use]
    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|l| **l).count()
    }
}

/// Per-row cluster assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    /// Cluster count used.
    pub k: usize,
    /// Cluster id per row, parallel to the window; every id is in `[0, k)`.
    pub assignments: Vec<usize>,
    /// Member count per cluster id, covering every id in `[0, k)`.
    pub sizes: BTreeMap<usize, usize>,
    /// Sum of squared distances to the assigned centroids (standardized space).
    pub inertia: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod outcome_tests {
        use super::*;

        #[test]
        fn ready_accessors() {
            let outcome: Outcome<u32> = Outcome::Ready(7);
            assert!(outcome.is_ready());
            assert!(!outcome.is_insufficient());
            assert_eq!(outcome.as_ready(), Some(&7));
            assert!(outcome.insufficient().is_none());
            assert_eq!(outcome.map(|v| v * 2).ready(), Some(14));
        }

        #[test]
        fn insufficient_accessors() {
            let marker = InsufficientData::new(Pipeline::Anomaly, 30, 29);
            let outcome: Outcome<u32> = Outcome::Insufficient(marker);
            assert!(outcome.is_insufficient());
            assert_eq!(outcome.insufficient(), Some(&marker));
            assert_eq!(outcome.ready(), None);
        }

        #[test]
        fn insufficient_display() {
            let marker = InsufficientData::new(Pipeline::Cluster, 30, 12);
            assert_eq!(
                marker.to_string(),
                "insufficient data for cluster: need 30 rows, have 12"
            );
        }

        #[test]
        fn outcome_serializes_with_status_tag() {
            let outcome: Outcome<ClusterResult> =
                Outcome::Insufficient(InsufficientData::new(Pipeline::Forecast, 15, 3));
            let json = serde_json::to_value(&outcome).unwrap();
            assert_eq!(json["status"], "insufficient");
            assert_eq!(json["pipeline"], "forecast");
            assert_eq!(json["required"], 15);
        }
    }

    mod params_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn defaults() {
            assert_eq!(ForecastParams::default().lags, 5);
            assert!((AnomalyParams::default().contamination - 0.03).abs() < f64::EPSILON);
            assert_eq!(ClusterParams::default().k, 3);
        }

        #[test]
        fn zero_lags_rejected() {
            assert!(ForecastParams::default().with_lags(0).validate().is_err());
            assert!(ForecastParams::default().with_lags(1).validate().is_ok());
        }

        #[test]
        fn zero_k_rejected() {
            assert!(ClusterParams::default().with_k(0).validate().is_err());
            assert!(ClusterParams::default().with_k(1).validate().is_ok());
        }

        #[test_case(0.0, false ; "zero")]
        #[test_case(-0.1, false ; "negative")]
        #[test_case(0.0001, true ; "tiny")]
        #[test_case(0.5, true ; "upper bound")]
        #[test_case(0.51, false ; "above upper bound")]
        #[test_case(f64::NAN, false ; "nan")]
        fn contamination_range(value: f64, ok: bool) {
            let params = AnomalyParams::default().with_contamination(value);
            assert_eq!(params.validate().is_ok(), ok);
        }
    }
}
