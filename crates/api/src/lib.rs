// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Tollgate API Library
//!
//! Login, refresh-token rotation with reuse detection, logout and
//! access-token validation over a Redis-backed session cache.

pub mod auth;
pub mod config;
pub mod error;
pub mod response;
pub mod routes;
pub mod security;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use routes::create_router;
pub use state::AppState;
