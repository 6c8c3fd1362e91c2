//! Top-level handling of irrecoverable authentication failures.
//!
//! The API client only reports `AuthenticationRequired` / `SessionExpired`.
//! Whoever owns navigation wraps calls in a [`SignInBoundary`], which sends
//! the user to the sign-in page before the error reaches the caller.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::api::ApiError;

/// Path of the sign-in page.
pub const SIGN_IN_PATH: &str = "/sign-in";

/// Performs a full-document navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that only records where it was asked to go.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(path.to_string());
        }
    }
}

#[derive(Clone)]
pub struct SignInBoundary {
    navigator: Arc<dyn Navigator>,
}

impl SignInBoundary {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { navigator }
    }

    /// Await `call`; on an error that ends the session, navigate to the
    /// sign-in page and then hand the error back.
    pub async fn guard<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let result = call.await;
        if let Err(ref e) = result {
            self.handle(e);
        }
        result
    }

    /// Navigate if `error` requires signing in again. Returns whether it did.
    pub fn handle(&self, error: &ApiError) -> bool {
        if !error.requires_sign_in() {
            return false;
        }
        info!(reason = %error, "Redirecting to sign-in");
        self.navigator.navigate(SIGN_IN_PATH);
        true
    }
}
