//! schooldesk - command-line front-end for the school management API.
//!
//! Drives the authenticated API client the same way the dashboard pages
//! do: tokens live in a credential store, every call goes through the
//! sign-in boundary, and a session that cannot be refreshed sends the user
//! back to the sign-in page.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use schooldesk_core::api::ApiClient;
use schooldesk_core::auth::{
    CallbackQuery, CredentialStore, FileStore, KeyringStore, MemoryStore, Navigator,
    OAuthCallback, SessionTokens, SignInBoundary,
};
use schooldesk_core::config::{Config, APP_NAME};
use schooldesk_core::routes::{guard, GuardDecision};
use serde_json::Value;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "schooldesk", version, about = "School management API client")]
struct Cli {
    /// Where session tokens are kept
    #[arg(long, value_enum, default_value_t = StoreKind::File, env = "SCHOOLDESK_STORE")]
    store: StoreKind,

    /// Also write logs to a daily-rolled file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    File,
    Keyring,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show configuration and whether a session is stored
    Status,
    /// Store session tokens obtained elsewhere
    Login {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: String,
    },
    /// Remove stored session tokens
    Logout,
    /// GET an endpoint
    Get {
        endpoint: String,
        /// Send without credentials
        #[arg(long)]
        public: bool,
    },
    /// POST a JSON body to an endpoint
    Post {
        endpoint: String,
        body: String,
        #[arg(long)]
        public: bool,
    },
    /// PUT a JSON body to an endpoint
    Put { endpoint: String, body: String },
    /// DELETE an endpoint
    Delete { endpoint: String },
    /// Evaluate the route guard for a page request
    Route {
        path: String,
        /// Raw Cookie header
        #[arg(long)]
        cookie: Option<String>,
    },
    /// Complete an OAuth sign-in from the callback query string
    OauthCallback { query: String },
}

/// Prints the redirect a browser would follow.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, path: &str) {
        eprintln!("Redirecting to {}", path);
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", APP_NAME));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn open_store(kind: StoreKind, config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match kind {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::File => Arc::new(FileStore::new(config.cache_dir()?)),
        StoreKind::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
    };
    Ok(store)
}

fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("Request body must be valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_ref());

    let config = Config::load().context("Failed to load configuration")?;
    info!(api = %config.api_base_url, "schooldesk starting");

    let store = open_store(cli.store, &config)?;
    let client = ApiClient::new(&config, store.clone())?;
    let boundary = SignInBoundary::new(Arc::new(TerminalNavigator));

    match cli.command {
        Command::Status => {
            let tokens = store.get()?;
            println!("API base URL:  {}", config.api_base_url);
            println!("Store:         {:?}", cli.store);
            println!("Authenticated: {}", tokens.is_authenticated());
            println!("Refresh token: {}", if tokens.refresh_token.is_some() { "present" } else { "absent" });
        }
        Command::Login { access, refresh } => {
            client.sign_in(&SessionTokens::new(access, refresh))?;
            println!("Session stored");
        }
        Command::Logout => {
            client.sign_out()?;
            println!("Signed out");
        }
        Command::Get { endpoint, public } => {
            let value: Value = if public {
                boundary.guard(client.get_public(&endpoint)).await?
            } else {
                boundary.guard(client.get(&endpoint)).await?
            };
            print_json(&value)?;
        }
        Command::Post { endpoint, body, public } => {
            let body = parse_body(&body)?;
            let value: Value = if public {
                boundary.guard(client.post_public(&endpoint, &body)).await?
            } else {
                boundary.guard(client.post(&endpoint, &body)).await?
            };
            print_json(&value)?;
        }
        Command::Put { endpoint, body } => {
            let body = parse_body(&body)?;
            let value: Value = boundary.guard(client.put(&endpoint, &body)).await?;
            print_json(&value)?;
        }
        Command::Delete { endpoint } => {
            let value: Value = boundary.guard(client.delete(&endpoint)).await?;
            print_json(&value)?;
        }
        Command::Route { path, cookie } => match guard(&path, cookie.as_deref()) {
            GuardDecision::Continue => println!("continue"),
            GuardDecision::Redirect(to) => println!("redirect {}", to),
        },
        Command::OauthCallback { query } => {
            let callback = OAuthCallback::from_config(&config)?;
            let outcome = callback.complete(&CallbackQuery::parse(&query)).await;
            if let Some(ref tokens) = outcome.tokens {
                client.sign_in(tokens)?;
            }
            for cookie in &outcome.cookies {
                println!("Set-Cookie: {}", cookie);
            }
            println!("Location: {}", outcome.redirect);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_commands() {
        let cli = Cli::try_parse_from(["schooldesk", "--store", "memory", "get", "/students", "--public"])
            .expect("get should parse");
        assert_eq!(cli.store, StoreKind::Memory);
        match cli.command {
            Command::Get { endpoint, public } => {
                assert_eq!(endpoint, "/students");
                assert!(public);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["schooldesk", "put", "/marks/4", r#"{"score": 91}"#])
            .expect("put should parse");
        assert!(matches!(cli.command, Command::Put { .. }));
    }

    #[test]
    fn test_login_requires_both_tokens() {
        assert!(Cli::try_parse_from(["schooldesk", "login", "--access", "a"]).is_err());
        assert!(Cli::try_parse_from(["schooldesk", "login", "--access", "a", "--refresh", "r"]).is_ok());
    }

    #[test]
    fn test_parse_body_rejects_invalid_json() {
        assert!(parse_body("{not json").is_err());
        assert_eq!(parse_body(r#"{"a": 1}"#).unwrap()["a"], 1);
    }
}
