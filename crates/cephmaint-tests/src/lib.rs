//! cephmaint Test & Validation
//!
//! Cluster fixtures, end-to-end maintenance scenarios against the in-memory
//! cluster, request dispatch tests and property-based tests for the runner.

pub mod harness;
pub mod maintenance_scenarios;
pub mod proptest_runner;
pub mod request_dispatch;

pub use harness::{init_tracing, orchestrator, ClusterFixture};
