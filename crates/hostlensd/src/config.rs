//! Daemon configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use hostlens_report::ReportConfig;

use crate::error::{DaemonError, DaemonResult};

/// Label shown for the in-memory store.
pub const EPHEMERAL_STORE_LABEL: &str = ":memory:";

/// Configuration for the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Period between samples.
    pub sample_interval: Duration,
    /// Period between background report passes.
    pub report_interval: Duration,
    /// Default lookback for windows, in minutes.
    pub window_minutes: f64,
    /// Seed synthetic history into a near-empty store at startup.
    pub demo_seed: bool,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Directory receiving the generated report.
    pub report_dir: PathBuf,
    /// Keep samples in memory instead of `db_path`.
    pub ephemeral: bool,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sample_interval: Duration::from_secs(5),
            report_interval: Duration::from_secs(60),
            window_minutes: 60.0,
            demo_seed: true,
            db_path: PathBuf::from("data/metrics.db"),
            report_dir: PathBuf::from("report"),
            ephemeral: false,
            cors_origins: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Set the sampling period.
    #[must_use]
    pub const fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the report period.
    #[must_use]
    pub const fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Set the default window.
    #[must_use]
    pub const fn with_window_minutes(mut self, minutes: f64) -> Self {
        self.window_minutes = minutes;
        self
    }

    /// Enable or disable demo seeding.
    #[must_use]
    pub const fn with_demo_seed(mut self, enabled: bool) -> Self {
        self.demo_seed = enabled;
        self
    }

    /// Set the database file.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Set the report directory.
    #[must_use]
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Use an in-memory store.
    #[must_use]
    pub const fn with_ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Sampling period in seconds.
    #[must_use]
    pub fn interval_secs(&self) -> f64 {
        self.sample_interval.as_secs_f64()
    }

    /// How the store is named in metadata and reports.
    #[must_use]
    pub fn store_label(&self) -> String {
        if self.ephemeral {
            EPHEMERAL_STORE_LABEL.to_string()
        } else {
            self.db_path.display().to_string()
        }
    }

    /// Settings for the report generator.
    #[must_use]
    pub fn report_config(&self) -> ReportConfig {
        ReportConfig::new(self.report_dir.clone())
            .with_window_minutes(self.window_minutes)
            .with_sample_interval_secs(self.interval_secs())
            .with_store_label(self.store_label())
    }

    /// Checks the values the daemon cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Config`] naming the first bad value.
    pub fn validate(&self) -> DaemonResult<()> {
        if self.sample_interval.is_zero() {
            return Err(DaemonError::Config("sample interval must be positive".to_string()));
        }
        if self.report_interval.is_zero() {
            return Err(DaemonError::Config("report interval must be positive".to_string()));
        }
        if !self.window_minutes.is_finite() || self.window_minutes <= 0.0 {
            return Err(DaemonError::Config(format!(
                "window minutes must be a positive number, got {}",
                self.window_minutes
            )));
        }
        if !self.ephemeral && self.db_path.as_os_str().is_empty() {
            return Err(DaemonError::Config("database path is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.sample_interval, Duration::from_secs(5));
        assert_eq!(config.report_interval, Duration::from_secs(60));
        assert!((config.window_minutes - 60.0).abs() < f64::EPSILON);
        assert!(config.demo_seed);
        assert_eq!(config.db_path, PathBuf::from("data/metrics.db"));
        assert_eq!(config.report_dir, PathBuf::from("report"));
        assert!(!config.ephemeral);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DaemonConfig::new(SocketAddr::from(([127, 0, 0, 1], 9000)))
            .with_sample_interval(Duration::from_secs(2))
            .with_report_interval(Duration::from_secs(30))
            .with_window_minutes(15.0)
            .with_demo_seed(false)
            .with_db_path("/tmp/m.db")
            .with_report_dir("/tmp/out")
            .with_cors_origin("http://localhost:3000");

        assert_eq!(config.bind_addr.port(), 9000);
        assert!((config.interval_secs() - 2.0).abs() < f64::EPSILON);
        assert!(!config.demo_seed);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert_eq!(config.store_label(), "/tmp/m.db");
    }

    #[test]
    fn test_ephemeral_store_label() {
        let config = DaemonConfig::default().with_ephemeral(true);
        assert_eq!(config.store_label(), EPHEMERAL_STORE_LABEL);
    }

    #[test]
    fn test_report_config_follows_daemon() {
        let config = DaemonConfig::default()
            .with_window_minutes(30.0)
            .with_report_dir("out");
        let report = config.report_config();

        assert_eq!(report.output_dir, PathBuf::from("out"));
        assert!((report.window_minutes - 30.0).abs() < f64::EPSILON);
        assert!((report.sample_interval_secs - 5.0).abs() < f64::EPSILON);
        assert_eq!(report.store_label, "data/metrics.db");
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-5.0 ; "negative")]
    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinite")]
    fn test_bad_window_is_rejected(minutes: f64) {
        let err = DaemonConfig::default().with_window_minutes(minutes).validate().unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        assert!(DaemonConfig::default().with_sample_interval(Duration::ZERO).validate().is_err());
        assert!(DaemonConfig::default().with_report_interval(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_empty_db_path_needs_ephemeral() {
        let config = DaemonConfig::default().with_db_path("");
        assert!(config.validate().is_err());
        assert!(config.with_ephemeral(true).validate().is_ok());
    }
}
