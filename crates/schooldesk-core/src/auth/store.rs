//! Credential stores holding the access/refresh token pair.
//!
//! The API client never touches global state; it is handed an
//! `Arc<dyn CredentialStore>` and reads/writes tokens through it.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};

/// Storage key for the short-lived access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// The pair of session credentials. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access_token: Some(access.into()),
            refresh_token: Some(refresh.into()),
        }
    }

    /// A caller without an access token is unauthenticated.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

pub trait CredentialStore: Send + Sync {
    /// Current tokens; missing entries are `None`.
    fn get(&self) -> Result<SessionTokens>;

    /// Replace both tokens.
    fn set(&self, tokens: &SessionTokens) -> Result<()>;

    /// Replace only the access token, keeping the refresh token.
    fn set_access_token(&self, token: &str) -> Result<()> {
        let mut tokens = self.get()?;
        tokens.access_token = Some(token.to_string());
        self.set(&tokens)
    }

    /// Remove every stored credential.
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    tokens: RwLock<SessionTokens>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: SessionTokens) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Result<SessionTokens> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| anyhow::anyhow!("credential store lock poisoned"))?;
        Ok(tokens.clone())
    }

    fn set(&self, tokens: &SessionTokens) -> Result<()> {
        let mut guard = self
            .tokens
            .write()
            .map_err(|_| anyhow::anyhow!("credential store lock poisoned"))?;
        *guard = tokens.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.set(&SessionTokens::default())
    }
}

// ============================================================================
// File store
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    #[serde(flatten)]
    tokens: SessionTokens,
    updated_at: DateTime<Utc>,
}

/// Tokens persisted as JSON in the per-user cache directory.
///
/// Writes go to a temporary sibling file that is renamed over the session
/// file, so readers never observe a partial write.
pub struct FileStore {
    cache_dir: PathBuf,
    /// Held across every read-modify-write of the session file.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Mutex::new(()),
        }
    }

    /// When the tokens were last written, if a session file exists.
    pub fn updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.lock()?;
        Ok(self.read()?.map(|f| f.updated_at))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow::anyhow!("session file lock poisoned"))
    }

    fn read(&self) -> Result<Option<SessionFile>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .context("Failed to read session file")?;
        let file: SessionFile = serde_json::from_str(&contents)
            .context("Failed to parse session file")?;
        Ok(Some(file))
    }

    fn write(&self, tokens: &SessionTokens) -> Result<()> {
        let path = self.session_path();
        std::fs::create_dir_all(&self.cache_dir)?;
        let file = SessionFile {
            tokens: tokens.clone(),
            updated_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&file)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &path).context("Failed to replace session file")?;
        Ok(())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> Result<SessionTokens> {
        let _guard = self.lock()?;
        Ok(self.read()?.map(|f| f.tokens).unwrap_or_default())
    }

    fn set(&self, tokens: &SessionTokens) -> Result<()> {
        let _guard = self.lock()?;
        self.write(tokens)
    }

    fn set_access_token(&self, token: &str) -> Result<()> {
        let _guard = self.lock()?;
        let mut tokens = self.read()?.map(|f| f.tokens).unwrap_or_default();
        tokens.access_token = Some(token.to_string());
        self.write(&tokens)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock()?;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

// ============================================================================
// OS keychain store
// ============================================================================

/// Tokens stored in the OS keychain, one entry per key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        let entry = self.entry(key)?;
        match value {
            Some(value) => entry
                .set_password(value)
                .context("Failed to store token in keychain"),
            None => match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e).context("Failed to delete token from keychain"),
            },
        }
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self) -> Result<SessionTokens> {
        Ok(SessionTokens {
            access_token: self.read(ACCESS_TOKEN_KEY)?,
            refresh_token: self.read(REFRESH_TOKEN_KEY)?,
        })
    }

    fn set(&self, tokens: &SessionTokens) -> Result<()> {
        self.write(ACCESS_TOKEN_KEY, tokens.access_token.as_deref())?;
        self.write(REFRESH_TOKEN_KEY, tokens.refresh_token.as_deref())
    }

    fn set_access_token(&self, token: &str) -> Result<()> {
        self.write(ACCESS_TOKEN_KEY, Some(token))
    }

    fn clear(&self) -> Result<()> {
        self.write(ACCESS_TOKEN_KEY, None)?;
        self.write(REFRESH_TOKEN_KEY, None)
    }
}
