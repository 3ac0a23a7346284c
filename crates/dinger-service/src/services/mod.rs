//! Service layer for Dingaling.
//!
//! # Components
//!
//! - `dingers` - Dinger creation and lookup
//! - `session_issuer` - Client id minting and subscription
//! - `broadcast` - Fan-out with pruning of dead subscriptions
//! - `delivery` - Delivery channel trait and in-memory implementation
//! - `redis_channel` - Redis-backed delivery channel

pub mod broadcast;
pub mod delivery;
pub mod dingers;
pub mod redis_channel;
pub mod session_issuer;

pub use broadcast::BroadcastDispatcher;
pub use delivery::{DeliveryChannel, MemoryDeliveryChannel, MessageStream};
pub use dingers::DingerService;
pub use redis_channel::RedisDeliveryChannel;
pub use session_issuer::SessionIssuer;
