use crate::error::DashboardError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const TOKEN_FILE_NAME: &str = "tokens.json";

/// Bearer token pair, stored under the fixed keys `access` and `refresh`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TokenPair {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// Source of bearer credentials handed to the HTTP client at construction.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn store(&self, tokens: TokenPair) -> Result<(), DashboardError>;
    fn replace_access(&self, access: String) -> Result<(), DashboardError>;
    fn clear(&self) -> Result<(), DashboardError>;

    fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<TokenPair>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

impl CredentialProvider for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().ok()?.access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.read().ok()?.refresh.clone()
    }

    fn store(&self, tokens: TokenPair) -> Result<(), DashboardError> {
        let mut guard = self
            .tokens
            .write()
            .map_err(|_| DashboardError::Auth("Token store lock poisoned".to_string()))?;
        *guard = tokens;
        Ok(())
    }

    fn replace_access(&self, access: String) -> Result<(), DashboardError> {
        let mut guard = self
            .tokens
            .write()
            .map_err(|_| DashboardError::Auth("Token store lock poisoned".to_string()))?;
        guard.access = Some(access);
        Ok(())
    }

    fn clear(&self) -> Result<(), DashboardError> {
        self.store(TokenPair::default())
    }
}

/// Token store persisted as JSON in the platform data directory. The file is
/// the source of truth; the in-memory copy is refreshed on every write.
#[derive(Debug)]
pub struct FileTokenStore {
    token_file_path: PathBuf,
    cached: RwLock<TokenPair>,
}

impl FileTokenStore {
    pub fn new() -> Result<Self, DashboardError> {
        let data_dir = ProjectDirs::from("", "", "flowdash")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| DashboardError::Auth("Could not determine data directory".to_string()))?;
        Self::at_path(data_dir.join(TOKEN_FILE_NAME))
    }

    pub fn at_path(token_file_path: PathBuf) -> Result<Self, DashboardError> {
        if let Some(parent) = token_file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let cached = Self::load(&token_file_path).unwrap_or_default();
        Ok(Self {
            token_file_path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.token_file_path
    }

    fn load(path: &Path) -> Result<TokenPair, DashboardError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn persist(&self, tokens: &TokenPair) -> Result<(), DashboardError> {
        let content = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.token_file_path, content)?;
        log::debug!("Saved tokens to {}", self.token_file_path.display());
        Ok(())
    }
}

impl CredentialProvider for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.cached.read().ok()?.access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.cached.read().ok()?.refresh.clone()
    }

    fn store(&self, tokens: TokenPair) -> Result<(), DashboardError> {
        self.persist(&tokens)?;
        let mut guard = self
            .cached
            .write()
            .map_err(|_| DashboardError::Auth("Token store lock poisoned".to_string()))?;
        *guard = tokens;
        Ok(())
    }

    fn replace_access(&self, access: String) -> Result<(), DashboardError> {
        let mut updated = self
            .cached
            .read()
            .map_err(|_| DashboardError::Auth("Token store lock poisoned".to_string()))?
            .clone();
        updated.access = Some(access);
        self.store(updated)
    }

    fn clear(&self) -> Result<(), DashboardError> {
        if self.token_file_path.exists() {
            fs::remove_file(&self.token_file_path)?;
        }
        let mut guard = self
            .cached
            .write()
            .map_err(|_| DashboardError::Auth("Token store lock poisoned".to_string()))?;
        *guard = TokenPair::default();
        Ok(())
    }
}
