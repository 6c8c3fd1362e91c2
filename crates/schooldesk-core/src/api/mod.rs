//! REST API client module for the school management backend.
//!
//! This module provides the `ApiClient` used by every dashboard view to
//! read and write students, classes, attendance, exams, marks, schedules,
//! subscriptions and location data.
//!
//! Calls carry a JWT bearer access token. An expired access token is
//! refreshed once per call through `/employee/auth/token-refresh`.

pub mod client;
pub mod error;

pub use client::{ApiClient, REFRESH_ENDPOINT};
pub use error::ApiError;
