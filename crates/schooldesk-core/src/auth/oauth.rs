//! OAuth sign-in callback.
//!
//! Exchanges the authorization code for an identity token at the identity
//! provider, trades that token for backend session tokens, and describes the
//! response the callback route sends: two http-only cookies and a redirect.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::boundary::SIGN_IN_PATH;
use super::store::{SessionTokens, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::config::{Config, OAuthConfig};
use crate::routes::DASHBOARD_PATH;

/// Backend endpoint that accepts a provider identity token.
pub const BACKEND_AUTH_ENDPOINT: &str = "/employee/auth/google";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("authorization code missing from callback")]
    MissingCode,

    #[error("identity provider returned an error: {0}")]
    ProviderDenied(String),

    #[error("code exchange failed: {0}")]
    TokenExchange(String),

    #[error("backend authentication failed: {0}")]
    BackendAuth(String),
}

impl CallbackError {
    /// Value of the `error` query parameter on the sign-in redirect.
    pub fn code(&self) -> &'static str {
        match self {
            CallbackError::MissingCode => "missing_code",
            CallbackError::ProviderDenied(_) => "provider_denied",
            CallbackError::TokenExchange(_) => "token_exchange_failed",
            CallbackError::BackendAuth(_) => "backend_auth_failed",
        }
    }
}

/// Query parameters the identity provider appends to the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

impl CallbackQuery {
    /// Parse a raw query string (with or without the leading `?`).
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = Some(value.into_owned()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "code" => parsed.code = value,
                "error" => parsed.error = value,
                _ => {}
            }
        }
        parsed
    }
}

/// What the callback route responds with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub redirect: String,
    /// `Set-Cookie` header values.
    pub cookies: Vec<String>,
    pub tokens: Option<SessionTokens>,
}

impl CallbackOutcome {
    fn signed_in(tokens: SessionTokens, access: &str, refresh: &str) -> Self {
        Self {
            redirect: DASHBOARD_PATH.to_string(),
            cookies: vec![
                session_cookie(ACCESS_TOKEN_KEY, access),
                session_cookie(REFRESH_TOKEN_KEY, refresh),
            ],
            tokens: Some(tokens),
        }
    }

    fn failed(error: &CallbackError) -> Self {
        Self {
            redirect: format!("{}?error={}", SIGN_IN_PATH, error.code()),
            cookies: Vec::new(),
            tokens: None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.tokens.is_some()
    }
}

fn session_cookie(name: &str, value: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; Secure; SameSite=Lax", name, value)
}

#[derive(Debug, Serialize)]
struct CodeExchangeForm<'a> {
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ProviderTokenResponse {
    id_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct BackendAuthRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct BackendAuthResponse {
    access: String,
    refresh: String,
}

pub struct OAuthCallback {
    client: Client,
    oauth: OAuthConfig,
    api_base_url: String,
}

impl OAuthCallback {
    /// Build a callback handler with its own HTTP client.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::new(client, config))
    }

    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            oauth: config.oauth.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run the whole callback. Never fails: errors become a sign-in redirect.
    pub async fn complete(&self, query: &CallbackQuery) -> CallbackOutcome {
        match self.sign_in(query).await {
            Ok(tokens) => {
                info!("OAuth sign-in completed");
                let access = tokens.access_token.clone().unwrap_or_default();
                let refresh = tokens.refresh_token.clone().unwrap_or_default();
                CallbackOutcome::signed_in(tokens, &access, &refresh)
            }
            Err(e) => {
                warn!(error = %e, "OAuth sign-in failed");
                CallbackOutcome::failed(&e)
            }
        }
    }

    /// Exchange the callback query for backend session tokens.
    pub async fn sign_in(&self, query: &CallbackQuery) -> Result<SessionTokens, CallbackError> {
        if let Some(ref error) = query.error {
            return Err(CallbackError::ProviderDenied(error.clone()));
        }
        let code = query.code.as_deref().ok_or(CallbackError::MissingCode)?;

        let id_token = self.exchange_code(code).await?;
        self.backend_auth(&id_token).await
    }

    async fn exchange_code(&self, code: &str) -> Result<String, CallbackError> {
        let missing = |name: &str| CallbackError::TokenExchange(format!("{} is not configured", name));
        let form = CodeExchangeForm {
            code,
            client_id: self.oauth.client_id.as_deref().ok_or_else(|| missing("client id"))?,
            client_secret: self
                .oauth
                .client_secret
                .as_deref()
                .ok_or_else(|| missing("client secret"))?,
            redirect_uri: self
                .oauth
                .redirect_uri
                .as_deref()
                .ok_or_else(|| missing("redirect uri"))?,
            grant_type: "authorization_code",
        };

        debug!(url = %self.oauth.token_url, "Exchanging authorization code");
        let response = self
            .client
            .post(&self.oauth.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CallbackError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CallbackError::TokenExchange(format!("status {}", response.status())));
        }

        let parsed: ProviderTokenResponse = response
            .json()
            .await
            .map_err(|e| CallbackError::TokenExchange(e.to_string()))?;
        parsed
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CallbackError::TokenExchange("no id_token in response".into()))
    }

    async fn backend_auth(&self, id_token: &str) -> Result<SessionTokens, CallbackError> {
        let url = format!("{}{}", self.api_base_url, BACKEND_AUTH_ENDPOINT);
        let response = self
            .client
            .post(&url)
            .json(&BackendAuthRequest { id_token })
            .send()
            .await
            .map_err(|e| CallbackError::BackendAuth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CallbackError::BackendAuth(format!("status {}", response.status())));
        }

        let parsed: BackendAuthResponse = response
            .json()
            .await
            .map_err(|e| CallbackError::BackendAuth(e.to_string()))?;
        Ok(SessionTokens::new(parsed.access, parsed.refresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn callback_for(server: &MockServer) -> OAuthCallback {
        let mut config = Config::default();
        config.api_base_url = server.uri();
        config.oauth = OAuthConfig {
            client_id: Some("client-1".into()),
            client_secret: Some("secret-1".into()),
            redirect_uri: Some("http://localhost:3000/api/auth/callback".into()),
            token_url: format!("{}/oauth/token", server.uri()),
        };
        OAuthCallback::new(Client::new(), &config)
    }

    fn code(code: &str) -> CallbackQuery {
        CallbackQuery {
            code: Some(code.into()),
            error: None,
        }
    }

    #[test]
    fn test_parse_query() {
        let query = CallbackQuery::parse("?code=4%2F0Ab&scope=email");
        assert_eq!(query.code.as_deref(), Some("4/0Ab"));
        assert!(query.error.is_none());

        let query = CallbackQuery::parse("error=access_denied&code=");
        assert_eq!(query.error.as_deref(), Some("access_denied"));
        assert!(query.code.is_none());
    }

    #[tokio::test]
    async fn test_successful_callback_sets_cookies_and_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id_token": "idt", "access_token": "g"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(BACKEND_AUTH_ENDPOINT))
            .and(body_json(json!({"id_token": "idt"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A", "refresh": "R"})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = callback_for(&server).complete(&code("abc")).await;

        assert!(outcome.is_signed_in());
        assert_eq!(outcome.redirect, "/dashboard");
        assert_eq!(
            outcome.cookies,
            vec![
                "access_token=A; Path=/; HttpOnly; Secure; SameSite=Lax".to_string(),
                "refresh_token=R; Path=/; HttpOnly; Secure; SameSite=Lax".to_string(),
            ]
        );
        assert_eq!(outcome.tokens, Some(SessionTokens::new("A", "R")));
    }

    #[tokio::test]
    async fn test_missing_code_and_provider_error() {
        let server = MockServer::start().await;
        let callback = callback_for(&server);

        let outcome = callback.complete(&CallbackQuery::default()).await;
        assert_eq!(outcome.redirect, "/sign-in?error=missing_code");
        assert!(outcome.cookies.is_empty());

        let denied = CallbackQuery {
            code: Some("abc".into()),
            error: Some("access_denied".into()),
        };
        let outcome = callback.complete(&denied).await;
        assert_eq!(outcome.redirect, "/sign-in?error=provider_denied");

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_code_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(BACKEND_AUTH_ENDPOINT))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = callback_for(&server).complete(&code("abc")).await;
        assert_eq!(outcome.redirect, "/sign-in?error=token_exchange_failed");
        assert!(!outcome.is_signed_in());
    }

    #[tokio::test]
    async fn test_failed_backend_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id_token": "idt"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(BACKEND_AUTH_ENDPOINT))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "Unknown employee"})))
            .mount(&server)
            .await;

        let err = callback_for(&server).sign_in(&code("abc")).await.unwrap_err();
        assert_eq!(err.code(), "backend_auth_failed");
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_exchange() {
        let server = MockServer::start().await;
        let mut config = Config::default();
        config.api_base_url = server.uri();
        let callback = OAuthCallback::new(Client::new(), &config);

        let err = callback.sign_in(&code("abc")).await.unwrap_err();
        assert!(matches!(err, CallbackError::TokenExchange(_)));
    }
}
