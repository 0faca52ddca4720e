//! Shared state for the daemon.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hostlens_metrics::{
    seed_demo_if_needed, MemorySampleStore, MetricSource, SampleStore, SeedConfig, SqliteSampleStore,
};
use hostlens_report::ReportGenerator;
use tracing::info;

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::startup::{process_startup, BackgroundTasks, StartupGate, StartupPhase};
use crate::supervisor::{spawn_reporter, spawn_sampler};

/// Runs synchronous work (store I/O, model fitting) on the blocking pool.
///
/// # Errors
///
/// Returns the closure's error, or `Internal` if the worker panicked.
pub async fn run_blocking<T, F>(work: F) -> DaemonResult<T>
where
    F: FnOnce() -> DaemonResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Opens the store the configuration asks for.
///
/// # Errors
///
/// Returns an error if the database file cannot be opened.
pub fn open_store(config: &DaemonConfig) -> DaemonResult<Arc<dyn SampleStore>> {
    if config.ephemeral {
        return Ok(Arc::new(MemorySampleStore::new()));
    }
    Ok(Arc::new(SqliteSampleStore::open(&config.db_path)?))
}

/// Shared state for the daemon.
#[derive(Debug)]
pub struct AppState {
    config: DaemonConfig,
    store: Arc<dyn SampleStore>,
    source: Arc<dyn MetricSource>,
    reports: Arc<ReportGenerator>,
    seed: SeedConfig,
    gate: Arc<StartupGate<BackgroundTasks>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates state around an opened store and a metric source.
    ///
    /// Startup goes through the process-wide gate: however many states exist,
    /// the first one to start seeds and launches the loops for all of them.
    pub fn new(config: DaemonConfig, store: Arc<dyn SampleStore>, source: Arc<dyn MetricSource>) -> Self {
        let reports = Arc::new(ReportGenerator::new(Arc::clone(&store), config.report_config()));
        Self {
            config,
            store,
            source,
            reports,
            seed: SeedConfig::default(),
            gate: process_startup(),
            started_at: Utc::now(),
        }
    }

    /// Replaces the demo seeder settings.
    #[must_use]
    pub fn with_seed_config(mut self, seed: SeedConfig) -> Self {
        self.seed = seed;
        self
    }

    /// Uses `gate` instead of the process-wide one.
    #[must_use]
    pub fn with_startup_gate(mut self, gate: Arc<StartupGate<BackgroundTasks>>) -> Self {
        self.gate = gate;
        self
    }

    /// Get the configuration.
    pub const fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Handle to the sample store.
    pub fn store(&self) -> Arc<dyn SampleStore> {
        Arc::clone(&self.store)
    }

    /// Handle to the report generator.
    pub fn reports(&self) -> Arc<ReportGenerator> {
        Arc::clone(&self.reports)
    }

    /// Where startup currently stands.
    pub fn startup_phase(&self) -> StartupPhase {
        self.gate.phase()
    }

    /// Background loops, once started.
    pub fn background(&self) -> Option<&BackgroundTasks> {
        self.gate.get()
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Prepares the store, seeds demo history and launches the sampler and
    /// report loops. Only the first successful call does any work.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created or seeding fails. The
    /// next call then retries.
    pub async fn ensure_started(&self) -> DaemonResult<&BackgroundTasks> {
        self.gate
            .get_or_try_init(|| async {
                let store = Arc::clone(&self.store);
                let seed = self.config.demo_seed.then(|| self.seed.clone());
                let seeded = run_blocking(move || {
                    store.prepare()?;
                    match seed {
                        Some(seed) => Ok(seed_demo_if_needed(store.as_ref(), &seed)?),
                        None => Ok(0),
                    }
                })
                .await?;

                let sampler = spawn_sampler(
                    Arc::clone(&self.store),
                    Arc::clone(&self.source),
                    self.config.sample_interval,
                );
                let reporter = spawn_reporter(Arc::clone(&self.reports), self.config.report_interval);

                info!(
                    seeded,
                    interval_sec = self.config.interval_secs(),
                    store = %self.config.store_label(),
                    "background tasks started"
                );
                Ok(BackgroundTasks {
                    seeded,
                    sampler,
                    reporter,
                })
            })
            .await
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        // Loops outlive a state while any other holder, including the
        // process-wide gate, still references them.
        if Arc::strong_count(&self.gate) == 1 {
            if let Some(tasks) = self.gate.get() {
                tasks.abort();
            }
        }
    }
}
