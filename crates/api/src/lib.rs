#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Nerbixa API Library
//!
//! HTTP surface of Nerbixa: metered generation endpoints, payment webhooks,
//! gateway checkout and account routes.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod providers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
