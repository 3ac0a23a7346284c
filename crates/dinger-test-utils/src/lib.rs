//! # Dinger Test Utilities
//!
//! Shared test utilities for the Dingaling service.
//!
//! This crate provides:
//! - Server test harness (`TestDingerServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dinger_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let server = TestDingerServer::spawn().await?;
//!     let client = reqwest::Client::new();
//!
//!     let response = client
//!         .get(&format!("{}/health", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

pub use server_harness::*;
