//! Session persistence backends
//!
//! - [`MemorySessionStore`]: process-local, lost on exit
//! - [`FileSessionStore`]: JSON document on disk, survives restarts

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::traits::SessionStore;
use super::types::{IdentityError, TokenSet};

/// In-memory session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    tokens: RwLock<Option<TokenSet>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a session already present.
    #[must_use]
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self { tokens: RwLock::new(Some(tokens)) }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<TokenSet>, IdentityError> {
        Ok(self.tokens.read().clone())
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), IdentityError> {
        *self.tokens.write() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), IdentityError> {
        *self.tokens.write() = None;
        Ok(())
    }
}

/// JSON file session store
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<TokenSet>, IdentityError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IdentityError::Store(e.to_string())),
        };

        let tokens = serde_json::from_str(&contents)
            .map_err(|e| IdentityError::Store(format!("corrupt session file: {e}")))?;
        debug!(path = %self.path.display(), "Loaded persisted session");
        Ok(Some(tokens))
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IdentityError::Store(e.to_string()))?;
        }

        let contents =
            serde_json::to_string(tokens).map_err(|e| IdentityError::Store(e.to_string()))?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| IdentityError::Store(e.to_string()))
    }

    async fn clear(&self) -> Result<(), IdentityError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IdentityError::Store(e.to_string())),
        }
    }
}
