//! # hostlensd
//!
//! Host metrics daemon: samples the machine on a fixed interval, keeps the
//! samples in a windowed store, and serves forecast, anomaly and cluster
//! analytics plus a periodically regenerated HTML report over HTTP.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hostlensd::{open_store, AppState, DaemonConfig, DaemonServer};
//! use hostlens_metrics::SysinfoSource;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DaemonConfig::default();
//!     let store = open_store(&config)?;
//!     let state = AppState::new(config.clone(), store, Arc::new(SysinfoSource::new()));
//!
//!     let server = DaemonServer::new(Arc::new(state));
//!     server.serve(config.bind_addr).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/healthz` | GET | Liveness, plain `ok` |
//! | `/about` | GET | Version and effective settings |
//! | `/metrics` | GET | Latest 12 samples of the default window |
//! | `/ai/forecast` | GET | Lagged OLS CPU forecast (`window_minutes`, `lags`) |
//! | `/ai/anomaly` | GET | Isolation-forest anomaly rate (`window_minutes`, `contamination`) |
//! | `/ai/clusters` | GET | K-means cluster sizes (`window_minutes`, `k`) |
//! | `/snapshot` | GET, POST | Regenerate the report now |
//! | `/report/html` | GET | The generated report |
//! | `/report/img/{name}` | GET | A generated chart |
//! | `/dashboard` | GET | Landing page with links |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod startup;
pub mod state;
pub mod supervisor;

// Re-export main types
pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use server::DaemonServer;
pub use startup::{process_startup, BackgroundTasks, StartupGate, StartupPhase};
pub use state::{open_store, run_blocking, AppState};
pub use supervisor::{spawn_reporter, spawn_sampler, spawn_supervised};
