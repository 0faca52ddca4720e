//! Host metric samples and the windowed time-series store behind them.
#![forbid(unsafe_code)]
//!
//! `hostlens-metrics` owns everything between the OS and the analytics
//! pipelines: reading host counters, persisting one row per instant, and
//! loading trailing windows of history.
//!
//! # Features
//!
//! - **Keyed upserts**: one row per timestamp, last write wins
//! - **Ordered scans**: windows always come back ascending by time
//! - **Durable or in-memory**: SQLite for the daemon, a `BTreeMap` for tests
//! - **Demo history**: bootstrap a fresh store so analytics work immediately
//!
//! # Example
//!
//! ```rust
//! use hostlens_metrics::{
//!     load_window, sample_once, MemorySampleStore, SampleStore, StaticSource,
//! };
//!
//! let store = MemorySampleStore::new();
//! let source = StaticSource::new(25.0, 40.0, None);
//!
//! // One sampler tick; missing load averages are stored as zeros.
//! let sample = sample_once(&source, &store).unwrap();
//! assert_eq!(sample.load_1m, 0.0);
//!
//! // Everything from the last five minutes.
//! let window = load_window(&store, 5.0).unwrap();
//! assert_eq!(window.len(), 1);
//! ```

#![doc(html_root_url = "https://docs.rs/hostlens-metrics/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod collector;
pub mod error;
pub mod query;
pub mod seed;
pub mod sqlite;
pub mod storage;
pub mod types;

// Re-export main types at crate root
pub use collector::{read_sample, sample_once, MetricSource, StaticSource, SysinfoSource};
pub use error::{MetricsError, Result};
pub use query::{load_window, load_window_at, lookback};
pub use seed::{seed_demo_if_needed, SeedConfig};
pub use sqlite::SqliteSampleStore;
pub use storage::{MemorySampleStore, SampleStore};
pub use types::{format_timestamp, parse_timestamp, LoadAverages, Sample, Window};
