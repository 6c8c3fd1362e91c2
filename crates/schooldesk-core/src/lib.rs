//! Core library for schooldesk.
//!
//! The authenticated API client and the pieces around it: configuration,
//! credential stores, the sign-in boundary, the route guard and the OAuth
//! sign-in callback.

pub mod api;
pub mod auth;
pub mod config;
pub mod routes;

pub use api::{ApiClient, ApiError};
pub use config::Config;
