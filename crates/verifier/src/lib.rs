//! Cpuset verifier agent
//!
//! HTTP surface over the verifier library: stateless checker endpoints,
//! per-node audit and available-resource queries, health and metrics.

pub mod api;
pub mod config;
