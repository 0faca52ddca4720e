//! Window loading.
//!
//! A window is every stored sample from `now - duration` up to now, ascending.
//! Loading is a single store query; nothing is cached between calls.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::storage::SampleStore;
use crate::types::Window;

/// Converts a lookback in (possibly fractional) minutes into a duration.
///
/// # Errors
///
/// Returns `MetricsError::InvalidWindow` for negative, NaN or infinite input.
pub fn lookback(duration_minutes: f64) -> Result<Duration> {
    if !duration_minutes.is_finite() {
        return Err(MetricsError::InvalidWindow {
            reason: format!("duration must be finite, got {duration_minutes}"),
        });
    }
    if duration_minutes < 0.0 {
        return Err(MetricsError::InvalidWindow {
            reason: format!("duration must not be negative, got {duration_minutes}"),
        });
    }
    let millis = (duration_minutes * 60_000.0).round();
    // Keeps the conversion itself in range; the cutoff saturates separately.
    let millis = if millis > 9.0e15 { 9.0e15 } else { millis };
    Ok(Duration::milliseconds(millis as i64))
}

/// Loads the window ending now.
///
/// # Errors
///
/// Returns an error if the duration is invalid or the store query fails. An
/// empty result is not an error.
pub fn load_window(store: &dyn SampleStore, duration_minutes: f64) -> Result<Window> {
    load_window_at(store, duration_minutes, Utc::now())
}

/// Loads the window ending at `now`.
///
/// # Errors
///
/// Returns an error if the duration is invalid or the store query fails.
pub fn load_window_at(
    store: &dyn SampleStore,
    duration_minutes: f64,
    now: DateTime<Utc>,
) -> Result<Window> {
    // Lookbacks reaching past the earliest representable instant cover everything.
    let since = now
        .checked_sub_signed(lookback(duration_minutes)?)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let samples: Vec<_> = store
        .query_since(since)?
        .into_iter()
        .filter(|s| s.timestamp <= now)
        .collect();

    debug!(
        since = %since,
        until = %now,
        rows = samples.len(),
        "loaded window"
    );

    Ok(Window::new(since, now, samples))
}
