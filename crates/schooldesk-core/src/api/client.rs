//! API client for the school management backend.
//!
//! Every call goes through [`ApiClient::request`]: it attaches the stored
//! access token, and when the backend answers 401 it refreshes the token
//! once and replays the call. A replayed call never refreshes again.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{CredentialStore, SessionTokens};
use crate::config::Config;

use super::ApiError;

/// Endpoint that exchanges a refresh token for a new access token.
pub const REFRESH_ENDPOINT: &str = "/employee/auth/token-refresh";

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Where a call is in the refresh-and-retry flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Direct,
    /// The access token was refreshed; this attempt must not refresh again.
    RetryingAfterRefresh,
}

/// Authenticated API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and clones share the credential store and the refresh lock.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    /// Serialises refreshes so concurrent 401s trigger a single refresh call.
    refresh_lock: Arc<Mutex<()>>,
}

impl ApiClient {
    /// Create a client from the application configuration
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Self::with_client(client, &config.api_base_url, store)
    }

    /// Create a client around an existing connection pool.
    pub fn with_client(client: Client, base_url: &str, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;

        Ok(Self {
            client,
            base_url,
            store,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Whether an access token is currently stored.
    pub fn is_authenticated(&self) -> Result<bool, ApiError> {
        Ok(self.tokens()?.is_authenticated())
    }

    /// Start a session with tokens obtained from a login flow.
    pub fn sign_in(&self, tokens: &SessionTokens) -> Result<(), ApiError> {
        self.store.set(tokens).map_err(ApiError::CredentialStore)
    }

    /// Drop every stored credential.
    pub fn sign_out(&self) -> Result<(), ApiError> {
        self.store.clear().map_err(ApiError::CredentialStore)
    }

    // ===== Core request path =====

    /// Perform a call against `{base}{endpoint}` and decode the JSON payload.
    ///
    /// With `requires_auth`, the stored access token is sent as a bearer
    /// credential and a 401 triggers one refresh-and-retry. Without it, no
    /// credential is sent and a 401 is returned like any other failure.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        requires_auth: bool,
    ) -> Result<T, ApiError> {
        let url = self.url_for(endpoint);
        let mut attempt = Attempt::Direct;

        let mut sent_token = if requires_auth {
            self.tokens()?.access_token
        } else {
            None
        };

        loop {
            debug!(method = %method, url = %url, ?attempt, "Sending API request");
            let response = self
                .send(method.clone(), &url, body, sent_token.as_deref())
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED
                && requires_auth
                && attempt == Attempt::Direct
            {
                let fresh = self.refresh_access_token(sent_token.as_deref()).await?;
                sent_token = Some(fresh);
                attempt = Attempt::RetryingAfterRefresh;
                continue;
            }

            return Self::decode(response).await;
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, Method::GET, None, true).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.request(endpoint, Method::POST, Some(&body), true).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.request(endpoint, Method::PUT, Some(&body), true).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, Method::DELETE, None, true).await
    }

    /// GET without credentials (public endpoints).
    pub async fn get_public<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, Method::GET, None, false).await
    }

    /// POST without credentials (login and other public endpoints).
    pub async fn post_public<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.request(endpoint, Method::POST, Some(&body), false).await
    }

    // ===== Refresh =====

    /// Obtain a fresh access token after a 401.
    ///
    /// `stale` is the token the failed call sent. If another call already
    /// replaced it while this one waited for the lock, that token is reused;
    /// if another call's failed refresh ended the session instead, this call
    /// fails the same way. Irrecoverable failures clear the store before
    /// returning.
    async fn refresh_access_token(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        let tokens = self.tokens()?;

        if stale.is_some() && tokens.is_empty() {
            debug!("Session ended by a concurrent request");
            return Err(ApiError::SessionExpired);
        }

        if let Some(current) = tokens.access_token.as_deref() {
            if stale != Some(current) {
                debug!("Access token already refreshed by a concurrent request");
                return Ok(current.to_string());
            }
        }

        let Some(refresh) = tokens.refresh_token.filter(|t| !t.is_empty()) else {
            warn!("Unauthorized and no refresh token stored, ending session");
            self.end_session()?;
            return Err(ApiError::AuthenticationRequired);
        };

        match self.call_refresh(&refresh).await {
            Ok(access) => {
                self.store
                    .set_access_token(&access)
                    .map_err(ApiError::CredentialStore)?;
                info!("Access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.end_session()?;
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn call_refresh(&self, refresh: &str) -> Result<String, ApiError> {
        let url = self.url_for(REFRESH_ENDPOINT);
        let body = Self::encode(&RefreshRequest { refresh })?;
        let response = self.send(Method::POST, &url, Some(&body), None).await?;
        let parsed: RefreshResponse = Self::decode(response).await?;
        if parsed.access.is_empty() {
            return Err(ApiError::InvalidRequest("refresh returned an empty access token".into()));
        }
        Ok(parsed.access)
    }

    fn end_session(&self) -> Result<(), ApiError> {
        self.store.clear().map_err(ApiError::CredentialStore)
    }

    // ===== Helpers =====

    fn tokens(&self) -> Result<SessionTokens, ApiError> {
        self.store.get().map_err(ApiError::CredentialStore)
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    fn headers(token: Option<&str>) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidRequest(format!("invalid access token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut builder = self.client.request(method, url).headers(Self::headers(token)?);
        if let Some(body) = body {
            builder = builder.body(serde_json::to_vec(body)?);
        }
        Ok(builder.send().await?)
    }

    fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("failed to encode request body: {}", e)))
    }

    /// Map a response to the decoded payload or a `RequestFailed` error.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            // 204 and friends
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
