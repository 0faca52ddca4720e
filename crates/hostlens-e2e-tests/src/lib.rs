//! End-to-end integration tests for hostlens.
//!
//! These tests exercise the full stack:
//! - Store, seeder and window loader against SQLite on disk
//! - The three analytics pipelines at their row-count boundaries
//! - Report generation
//! - Concurrent writers and readers on one SQLite file
//! - Daemon startup gate and the HTTP API over a real socket

#![cfg(test)]
