use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GmailError, Result};

/// Scope that allows reading messages and moving them to and from trash
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Largest page size the messages.list endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub trash: TrashConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token_path: default_token_path(),
            scopes: default_scopes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size used when paginating through every match
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_results")]
    pub default_max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            default_max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default = "default_confirmation_token")]
    pub confirmation_token: String,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            progress_interval: default_progress_interval(),
            confirmation_token: default_confirmation_token(),
        }
    }
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_path() -> PathBuf {
    PathBuf::from(".gmail-cleaner/token.json")
}

fn default_scopes() -> Vec<String> {
    vec![GMAIL_MODIFY_SCOPE.to_string()]
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_max_results() -> u32 {
    50
}

fn default_batch_size() -> usize {
    100
}

fn default_progress_interval() -> usize {
    10
}

fn default_confirmation_token() -> String {
    "YES".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // A missing config file is not an error: every setting has a default
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply path overrides given on the command line
    pub fn with_overrides(
        mut self,
        credentials_path: Option<PathBuf>,
        token_path: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = credentials_path {
            self.auth.credentials_path = path;
        }
        if let Some(path) = token_path {
            self.auth.token_path = path;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.page_size == 0 || self.search.page_size > MAX_PAGE_SIZE {
            return Err(GmailError::ConfigError(format!(
                "search.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.search.default_max_results == 0 || self.search.default_max_results > MAX_PAGE_SIZE
        {
            return Err(GmailError::ConfigError(format!(
                "search.default_max_results must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.auth.scopes.is_empty() {
            return Err(GmailError::ConfigError(
                "auth.scopes must contain at least one scope".to_string(),
            ));
        }

        if self.trash.batch_size == 0 {
            return Err(GmailError::ConfigError(
                "trash.batch_size must be greater than 0".to_string(),
            ));
        }

        if self.trash.progress_interval == 0 {
            return Err(GmailError::ConfigError(
                "trash.progress_interval must be greater than 0".to_string(),
            ));
        }

        if self.trash.confirmation_token.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "trash.confirmation_token must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
