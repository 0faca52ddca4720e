//! Best-effort periodic background loops.
//!
//! Each tick runs its unit of work on the blocking pool. A failed or
//! panicking tick is logged and the loop carries on with the next one; the
//! loops stop only when aborted or when the runtime shuts down.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use hostlens_metrics::{sample_once, MetricSource, SampleStore};
use hostlens_report::ReportGenerator;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Spawns a loop that runs `work` every `period`, starting immediately.
pub fn spawn_supervised<F, E>(name: &'static str, period: Duration, work: F) -> JoinHandle<()>
where
    F: Fn() -> Result<(), E> + Send + Sync + 'static,
    E: Display + Send + 'static,
{
    let work = Arc::new(work);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(task = name, period_ms = period.as_millis(), "background loop started");

        loop {
            ticker.tick().await;
            let work = Arc::clone(&work);
            match tokio::task::spawn_blocking(move || (*work)()).await {
                Ok(Ok(())) => debug!(task = name, "tick finished"),
                Ok(Err(e)) => warn!(task = name, error = %e, "tick failed"),
                Err(e) if e.is_panic() => error!(task = name, "tick panicked"),
                Err(e) => error!(task = name, error = %e, "tick aborted"),
            }
        }
    })
}

/// Samples the host into `store` every `period`.
pub fn spawn_sampler(
    store: Arc<dyn SampleStore>,
    source: Arc<dyn MetricSource>,
    period: Duration,
) -> JoinHandle<()> {
    spawn_supervised("sampler", period, move || {
        sample_once(source.as_ref(), store.as_ref()).map(|_| ())
    })
}

/// Regenerates the report every `period`.
pub fn spawn_reporter(reports: Arc<ReportGenerator>, period: Duration) -> JoinHandle<()> {
    spawn_supervised("reporter", period, move || reports.generate().map(|_| ()))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use hostlens_metrics::{LoadAverages, MemorySampleStore, StaticSource};
    use hostlens_report::ReportConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_loop_survives_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = spawn_supervised("flaky", Duration::from_millis(5), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 { Err(format!("failure {n}")) } else { Ok(()) }
        });

        wait_for(|| calls.load(Ordering::SeqCst) >= 4).await;
        assert!(calls.load(Ordering::SeqCst) >= 4);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_loop_survives_panics() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = spawn_supervised("panicky", Duration::from_millis(5), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first tick blows up");
            }
            Ok::<(), String>(())
        });

        wait_for(|| calls.load(Ordering::SeqCst) >= 3).await;
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_sampler_writes_rows() {
        let store: Arc<dyn SampleStore> = Arc::new(MemorySampleStore::new());
        let source = Arc::new(StaticSource::new(12.5, 40.0, Some(LoadAverages::new(0.5, 0.4, 0.3))));
        let handle = spawn_sampler(Arc::clone(&store), source, Duration::from_millis(5));

        wait_for(|| store.count().unwrap_or(0) >= 1).await;
        handle.abort();

        let latest = store.latest(1).unwrap();
        assert_eq!(latest.len(), 1);
        assert!((latest[0].cpu_percent - 12.5).abs() < f64::EPSILON);
        assert!((latest[0].load_15m - 0.3).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reporter_writes_index() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SampleStore> = Arc::new(MemorySampleStore::new());
        let reports = Arc::new(ReportGenerator::new(store, ReportConfig::new(dir.path())));
        let index = reports.index_path();
        let handle = spawn_reporter(reports, Duration::from_secs(60));

        wait_for(|| index.exists()).await;
        handle.abort();
        assert!(index.exists());
    }
}
