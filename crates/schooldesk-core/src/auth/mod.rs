//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: the access/refresh token pair, in memory, in a
//!   session file or in the OS keychain
//! - `SignInBoundary`: navigation to the sign-in page when a session ends
//! - `OAuthCallback`: the identity-provider sign-in callback

pub mod boundary;
pub mod oauth;
pub mod store;

pub use boundary::{Navigator, RecordingNavigator, SignInBoundary, SIGN_IN_PATH};
pub use oauth::{CallbackError, CallbackOutcome, CallbackQuery, OAuthCallback};
pub use store::{CredentialStore, FileStore, KeyringStore, MemoryStore, SessionTokens};
