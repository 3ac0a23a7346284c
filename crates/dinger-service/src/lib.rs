//! Dingaling Service Library
//!
//! Dingers are named notification channels. Clients subscribe to a dinger and
//! receive every message broadcast to it over a per-client delivery session.
//! Clients whose delivery fails are pruned during the broadcast.
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//!                                       |
//!                                       +-> DeliveryChannel (Redis / memory)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `identifier` - Hex encoding of dinger ids
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Records and request/response types
//! - `observability` - Prometheus metrics
//! - `repositories` - Subscription store (PostgreSQL / memory)
//! - `routes` - Axum router setup
//! - `services` - Dinger, subscription and broadcast services

pub mod config;
pub mod errors;
pub mod handlers;
pub mod identifier;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
