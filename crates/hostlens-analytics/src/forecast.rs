//! Short-horizon CPU forecast.
//!
//! Each row is predicted from the `L` CPU readings before it. The first 80 %
//! of lagged rows (in time order) train an OLS model; the rest are held out
//! for MAE and R².

use hostlens_metrics::{Sample, Window};
use tracing::debug;

use crate::error::Result;
use crate::stats::{mean_absolute_error, r_squared, LinearModel};
use crate::types::{ForecastParams, ForecastResult, InsufficientData, Outcome, Pipeline};

/// Extra lagged rows required on top of the lag count.
pub const MIN_ROWS_BEYOND_LAGS: usize = 10;

/// Fraction of lagged rows used for training.
pub const TRAIN_FRACTION: f64 = 0.8;

/// Builds the lag matrix for a CPU series.
///
/// Row `i` of the result corresponds to sample `i + lags` and holds the CPU
/// values of samples `i + lags - 1` down to `i`. Returns `(features, targets)`.
#[must_use]
pub fn lag_matrix(cpu: &[f64], lags: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    if lags == 0 || cpu.len() <= lags {
        return (Vec::new(), Vec::new());
    }
    (lags..cpu.len())
        .map(|i| {
            let row = (1..=lags).map(|k| cpu[i - k]).collect();
            (row, cpu[i])
        })
        .unzip()
}

/// Runs the forecast pipeline over a window.
///
/// # Errors
///
/// Returns `InvalidParameter` if `lags` is zero. Short windows are reported
/// as [`Outcome::Insufficient`].
pub fn forecast(window: &Window, params: &ForecastParams) -> Result<Outcome<ForecastResult>> {
    params.validate()?;
    Ok(forecast_samples(window.samples(), params.lags))
}

fn forecast_samples(samples: &[Sample], lags: usize) -> Outcome<ForecastResult> {
    let cpu: Vec<f64> = samples.iter().map(|s| s.cpu_percent).collect();
    let (features, targets) = lag_matrix(&cpu, lags);
    let n = targets.len();

    let required = lags.saturating_add(MIN_ROWS_BEYOND_LAGS);
    if n < required {
        debug!(lags, lagged_rows = n, required, "forecast skipped: not enough rows");
        return Outcome::Insufficient(InsufficientData::new(Pipeline::Forecast, required, n));
    }

    let split = (n as f64 * TRAIN_FRACTION).floor() as usize;
    if split == 0 || split >= n {
        debug!(lagged_rows = n, split, "forecast skipped: empty train or test split");
        return Outcome::Insufficient(InsufficientData::new(Pipeline::Forecast, required, n));
    }

    let model = LinearModel::fit(&features[..split], &targets[..split]);
    let predicted: Vec<f64> = features[split..].iter().map(|row| model.predict(row)).collect();
    let actual = targets[split..].to_vec();
    let timestamps = samples[lags + split..]
        .iter()
        .map(|s| s.timestamp)
        .collect();

    let mae = mean_absolute_error(&actual, &predicted);
    let r2 = r_squared(&actual, &predicted);

    debug!(
        lags,
        lagged_rows = n,
        train = split,
        test = n - split,
        mae,
        r2,
        "forecast fitted"
    );

    Outcome::Ready(ForecastResult {
        lags,
        n_samples: n,
        n_train: split,
        timestamps,
        actual,
        predicted,
        mae,
        r2,
    })
}
