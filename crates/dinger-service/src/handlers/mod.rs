//! HTTP request handlers for Dingaling.

pub mod dingers;
pub mod health;
pub mod listen;
pub mod metrics;

pub use dingers::{connect, create_dinger, dinger_info, post_ding};
pub use health::{health_check, readiness_check};
pub use listen::listen;
pub use metrics::metrics_handler;
