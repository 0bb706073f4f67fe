//! Persistence backends for the session token pair.
//!
//! The session manager stores its tokens through a [`TokenStore`] so a
//! restarted client can resume a session. Persisted state never contains
//! plaintext credentials: [`FileTokenStore`] codec-encodes both tokens
//! before they touch disk.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use whisperkey_core::{codec, AuthTokens};

use crate::error::{Result, VaultError};

/// Async storage backend for the access/refresh token pair.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored pair, if any.
    async fn load(&self) -> Result<Option<AuthTokens>>;

    /// Persist the pair, replacing any previous one.
    async fn save(&self, tokens: &AuthTokens) -> Result<()>;

    /// Remove any stored pair. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<()>;
}

/// On-disk representation of the token pair, codec-encoded.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    access_token: String,
    refresh_token: String,
}

/// A token store backed by a single JSON file.
///
/// The file is written with mode `0600` (parent directory `0700`) on
/// Unix, matching how other credential material is kept on disk.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<AuthTokens>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| VaultError::storage(e.to_string()))?;
        let stored: StoredTokens =
            serde_json::from_str(&data).map_err(|e| VaultError::storage(e.to_string()))?;

        Ok(Some(AuthTokens::new(
            codec::decode(&stored.access_token),
            codec::decode(&stored.refresh_token),
        )))
    }

    async fn save(&self, tokens: &AuthTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::storage(e.to_string()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                tokio::fs::set_permissions(parent, perms)
                    .await
                    .map_err(|e| VaultError::storage(e.to_string()))?;
            }
        }

        let stored = StoredTokens {
            access_token: codec::encode(tokens.access_token.expose()),
            refresh_token: codec::encode(tokens.refresh_token.expose()),
        };
        let json =
            serde_json::to_string_pretty(&stored).map_err(|e| VaultError::storage(e.to_string()))?;

        debug!(path = %self.path.display(), "writing session tokens");
        tokio::fs::write(&self.path, json.as_bytes())
            .await
            .map_err(|e| VaultError::storage(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms)
                .await
                .map_err(|e| VaultError::storage(e.to_string()))?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        debug!(path = %self.path.display(), "clearing session tokens");
        tokio::fs::remove_file(&self.path)
            .await
            .map_err(|e| VaultError::storage(e.to_string()))
    }
}

/// An in-process token store for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: tokio::sync::Mutex<Option<AuthTokens>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a token pair, as if a previous
    /// session had persisted it.
    pub fn with_tokens(tokens: AuthTokens) -> Self {
        Self {
            tokens: tokio::sync::Mutex::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<AuthTokens>> {
        Ok(self.tokens.lock().await.clone())
    }

    async fn save(&self, tokens: &AuthTokens) -> Result<()> {
        *self.tokens.lock().await = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.tokens.lock().await = None;
        Ok(())
    }
}
