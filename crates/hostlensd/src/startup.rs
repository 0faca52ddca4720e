//! Run-once startup gate.
//!
//! Schema creation, demo seeding and launching the background loops must
//! happen once per process even when several callers (the binary and any
//! number of early HTTP requests) race into startup. [`StartupGate`] wraps a
//! `tokio::sync::OnceCell` and exposes the phase it is in. A failed or
//! cancelled initialization leaves the gate uninitialized so a later call
//! retries. [`process_startup`] is the gate every daemon state shares unless
//! it is given its own.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock};

use serde::Serialize;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

/// Where the gate is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPhase {
    /// Nothing has run, or the last attempt failed.
    Uninitialized,
    /// An initializer is running.
    Initializing,
    /// Initialization finished.
    Ready,
}

impl StartupPhase {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Ready => 2,
        }
    }
}

static PROCESS_STARTUP: LazyLock<Arc<StartupGate<BackgroundTasks>>> =
    LazyLock::new(|| Arc::new(StartupGate::new()));

/// The process-wide startup gate.
#[must_use]
pub fn process_startup() -> Arc<StartupGate<BackgroundTasks>> {
    Arc::clone(&PROCESS_STARTUP)
}

/// Resets the phase unless disarmed, so a cancelled initializer does not
/// leave the gate reporting `Initializing`.
struct PhaseReset<'a> {
    phase: &'a AtomicU8,
    armed: bool,
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.phase
                .store(StartupPhase::Uninitialized.as_u8(), Ordering::Release);
        }
    }
}

/// Holds the value produced by a one-time initializer.
#[derive(Debug)]
pub struct StartupGate<T> {
    cell: OnceCell<T>,
    phase: AtomicU8,
}

impl<T> Default for StartupGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StartupGate<T> {
    /// Creates an uninitialized gate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
            phase: AtomicU8::new(0),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> StartupPhase {
        StartupPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// The initialized value, if startup has completed.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Runs `init` unless a previous call already succeeded.
    ///
    /// Concurrent callers wait for the running initializer; only one `init`
    /// executes at a time and at most one ever succeeds.
    ///
    /// # Errors
    ///
    /// Returns the initializer's error. The gate is then uninitialized again,
    /// as it is when the returned future is dropped mid-initialization.
    pub async fn get_or_try_init<F, Fut, E>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell
            .get_or_try_init(|| async move {
                self.set_phase(StartupPhase::Initializing);
                let mut reset = PhaseReset {
                    phase: &self.phase,
                    armed: true,
                };
                let result = init().await;
                if result.is_ok() {
                    reset.armed = false;
                    self.set_phase(StartupPhase::Ready);
                }
                result
            })
            .await
    }

    fn set_phase(&self, phase: StartupPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }
}

/// What startup leaves running.
#[derive(Debug)]
pub struct BackgroundTasks {
    /// Rows written by the demo seeder (0 when skipped).
    pub seeded: usize,
    /// Periodic sampler loop.
    pub sampler: JoinHandle<()>,
    /// Periodic report loop.
    pub reporter: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Stops both loops.
    pub fn abort(&self) {
        self.sampler.abort();
        self.reporter.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_gate_starts_uninitialized() {
        let gate: StartupGate<u32> = StartupGate::new();
        assert_eq!(gate.phase(), StartupPhase::Uninitialized);
        assert!(gate.get().is_none());
    }

    #[tokio::test]
    async fn test_successful_init_is_ready() {
        let gate = StartupGate::new();
        let value = gate.get_or_try_init(|| async { Ok::<_, String>(7) }).await.unwrap();
        assert_eq!(*value, 7);
        assert_eq!(gate.phase(), StartupPhase::Ready);
        assert_eq!(gate.get(), Some(&7));
    }

    #[tokio::test]
    async fn test_second_call_reuses_value() {
        let gate = StartupGate::new();
        gate.get_or_try_init(|| async { Ok::<_, String>(1) }).await.unwrap();
        let value = gate.get_or_try_init(|| async { Ok::<_, String>(2) }).await.unwrap();
        assert_eq!(*value, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_initialize_once() {
        let gate = Arc::new(StartupGate::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = Arc::clone(&gate);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                let value = gate
                    .get_or_try_init(|| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>(42)
                    })
                    .await
                    .unwrap();
                *value
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(gate.phase(), StartupPhase::Ready);
    }

    #[tokio::test]
    async fn test_failure_allows_retry() {
        let gate = StartupGate::new();
        let err = gate
            .get_or_try_init(|| async { Err::<u32, _>("disk full".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "disk full");
        assert_eq!(gate.phase(), StartupPhase::Uninitialized);
        assert!(gate.get().is_none());

        let value = gate.get_or_try_init(|| async { Ok::<_, String>(3) }).await.unwrap();
        assert_eq!(*value, 3);
        assert_eq!(gate.phase(), StartupPhase::Ready);
    }

    #[tokio::test]
    async fn test_phase_is_initializing_while_running() {
        let gate = Arc::new(StartupGate::new());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let runner = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.get_or_try_init(|| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, String>(())
                })
                .await
                .map(|_| ())
            })
        };

        started_rx.await.unwrap();
        assert_eq!(gate.phase(), StartupPhase::Initializing);
        release_tx.send(()).unwrap();
        runner.await.unwrap().unwrap();
        assert_eq!(gate.phase(), StartupPhase::Ready);
    }

    #[tokio::test]
    async fn test_cancelled_init_resets_phase() {
        let gate: StartupGate<u32> = StartupGate::new();
        let attempt = tokio::time::timeout(
            Duration::from_millis(20),
            gate.get_or_try_init(|| async {
                std::future::pending::<()>().await;
                Ok::<_, String>(1)
            }),
        )
        .await;
        assert!(attempt.is_err());
        assert_eq!(gate.phase(), StartupPhase::Uninitialized);
        assert!(gate.get().is_none());

        let value = gate.get_or_try_init(|| async { Ok::<_, String>(2) }).await.unwrap();
        assert_eq!(*value, 2);
        assert_eq!(gate.phase(), StartupPhase::Ready);
    }

    #[test]
    fn test_process_gate_is_shared() {
        assert!(Arc::ptr_eq(&process_startup(), &process_startup()));
    }

    #[tokio::test]
    async fn test_abort_stops_tasks() {
        let tasks = BackgroundTasks {
            seeded: 0,
            sampler: tokio::spawn(std::future::pending()),
            reporter: tokio::spawn(std::future::pending()),
        };
        tasks.abort();
        let BackgroundTasks { sampler, reporter, .. } = tasks;
        assert!(sampler.await.unwrap_err().is_cancelled());
        assert!(reporter.await.unwrap_err().is_cancelled());
    }
}
