//! Observability module for Dingaling.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
