//! OAuth2 authentication for the Gmail API
//!
//! The [`Authenticator`] owns the credential lifecycle: load the stored
//! credential, refresh it when it has expired, or fall back to the
//! interactive browser flow. Every credential it produces is persisted
//! before it is returned. Token exchange itself is delegated to yup-oauth2
//! through the [`OAuthFlow`] seam.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use yup_oauth2::storage::{TokenInfo, TokenStorage, TokenStorageError};
use yup_oauth2::authorized_user::AuthorizedUserSecret;
use yup_oauth2::ApplicationSecret;

use crate::config::AuthConfig;
use crate::error::{GmailError, Result};

/// A credential is treated as expired this long before its real expiry
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth credential persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes asked for at consent time. The user may have unticked some of
    /// them on the consent screen, so this is not proof of a grant.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at > now + Duration::seconds(EXPIRY_SKEW_SECS),
            None => true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_valid(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }
}

/// States the authenticator passes through while producing a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    LoadedValid,
    LoadedExpired,
    /// Stored credential was not requested with every configured scope
    InsufficientScope,
    Refreshed,
    InteractiveRequired,
    Authenticated,
}

/// How a credential was obtained
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub credential: Credential,
    pub states: Vec<AuthState>,
}

impl AuthOutcome {
    pub fn final_state(&self) -> AuthState {
        self.states
            .last()
            .copied()
            .unwrap_or(AuthState::NoCredential)
    }
}

/// Local persistence for the credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>>;
    async fn save(&self, credential: &Credential) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Token exchange with the identity provider
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    /// Exchange the refresh token for a new access token
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Run the browser consent flow for `scopes`
    async fn interactive(&self, scopes: &[String]) -> Result<Credential>;
}

/// Credential stored as JSON on disk, readable by the owner only
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        match serde_json::from_str(&content) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                // An unreadable credential is replaced by re-authenticating
                warn!("Ignoring unreadable credential at {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&self.path, json).await?;
        secure_token_file(&self.path).await?;

        debug!("Credential saved to {:?}", self.path);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.path.exists() {
            tokio::fs::remove_file(&self.path).await?;
            info!("Removed stored credential at {:?}", self.path);
        }
        Ok(())
    }
}

/// Produces a valid credential, refreshing or re-authenticating as needed
pub struct Authenticator<S, F> {
    store: S,
    flow: F,
    scopes: Vec<String>,
}

impl<S: CredentialStore, F: OAuthFlow> Authenticator<S, F> {
    pub fn new(store: S, flow: F, scopes: Vec<String>) -> Self {
        Self {
            store,
            flow,
            scopes,
        }
    }

    /// Return a valid credential or a fatal authentication error
    pub async fn authenticate(&self) -> Result<AuthOutcome> {
        self.authenticate_at(Utc::now()).await
    }

    pub async fn authenticate_at(&self, now: DateTime<Utc>) -> Result<AuthOutcome> {
        let mut states = vec![AuthState::NoCredential];

        let stored = self.store.load().await?;

        let Some(credential) = stored else {
            info!("No stored credential, starting interactive authorization");
            return self.run_interactive(states).await;
        };

        if !credential.has_scopes(&self.scopes) {
            warn!(
                "Stored credential was requested for {:?} but {:?} are required",
                credential.scopes, self.scopes
            );
            states.push(AuthState::InsufficientScope);
            return self.run_interactive(states).await;
        }

        if credential.is_valid(now) {
            debug!("Stored credential is valid");
            states.push(AuthState::LoadedValid);
            return Ok(AuthOutcome { credential, states });
        }

        states.push(AuthState::LoadedExpired);

        if !credential.can_refresh() {
            info!("Stored credential expired and has no refresh token");
            return self.run_interactive(states).await;
        }

        info!("Refreshing expired credential");
        let refreshed = self.flow.refresh(&credential).await.map_err(|e| match e {
            GmailError::AuthError(_) => e,
            other => GmailError::AuthError(format!("Failed to refresh credential: {}", other)),
        })?;
        self.store.save(&refreshed).await?;
        states.push(AuthState::Refreshed);

        Ok(AuthOutcome {
            credential: refreshed,
            states,
        })
    }

    /// Discard the stored credential and run the interactive flow
    pub async fn force_reauth(&self) -> Result<AuthOutcome> {
        self.store.clear().await?;
        self.run_interactive(vec![AuthState::NoCredential]).await
    }

    async fn run_interactive(&self, mut states: Vec<AuthState>) -> Result<AuthOutcome> {
        states.push(AuthState::InteractiveRequired);

        let credential = self.flow.interactive(&self.scopes).await.map_err(|e| match e {
            GmailError::AuthError(_) | GmailError::MissingClientSecret { .. } => e,
            other => GmailError::AuthError(format!("Interactive authorization failed: {}", other)),
        })?;
        self.store.save(&credential).await?;
        states.push(AuthState::Authenticated);

        info!("Authorization complete, requested scopes: {:?}", credential.scopes);
        Ok(AuthOutcome { credential, states })
    }
}

/// Build the production authenticator from configuration
pub fn authenticator_from_config(
    config: &AuthConfig,
) -> Authenticator<FileCredentialStore, InstalledAppFlow> {
    Authenticator::new(
        FileCredentialStore::new(&config.token_path),
        InstalledAppFlow::new(&config.credentials_path),
        config.scopes.clone(),
    )
}

/// Load the OAuth client secret descriptor
///
/// Falls back to `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET` when the file
/// does not exist.
pub async fn load_client_secret(path: &Path) -> Result<ApplicationSecret> {
    if path.exists() {
        return yup_oauth2::read_application_secret(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read credentials: {}", e)));
    }

    match load_credentials_from_env() {
        Ok(secret) => {
            info!("Using OAuth client from environment variables");
            Ok(secret)
        }
        Err(_) => Err(GmailError::MissingClientSecret {
            path: path.to_path_buf(),
        }),
    }
}

/// Load OAuth2 client credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| GmailError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GMAIL_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Captures the token yup-oauth2 obtains so its refresh token can be kept
#[derive(Clone, Default)]
struct CapturedToken {
    token: Arc<Mutex<Option<TokenInfo>>>,
}

impl CapturedToken {
    fn take(&self) -> Option<TokenInfo> {
        self.token.lock().ok().and_then(|mut t| t.take())
    }
}

#[async_trait]
impl TokenStorage for CapturedToken {
    async fn set(
        &self,
        _scopes: &[&str],
        token: TokenInfo,
    ) -> std::result::Result<(), TokenStorageError> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| TokenStorageError::Other("token capture lock poisoned".into()))?;
        *slot = Some(token);
        Ok(())
    }

    async fn get(&self, _target_scopes: &[&str]) -> Option<TokenInfo> {
        // Never hand a token back: each flow starts from scratch
        None
    }
}

fn to_utc(timestamp: Option<i64>) -> Option<DateTime<Utc>> {
    timestamp.and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Installed-app (desktop) OAuth flow backed by yup-oauth2
pub struct InstalledAppFlow {
    client_secret_path: PathBuf,
}

impl InstalledAppFlow {
    pub fn new(client_secret_path: impl Into<PathBuf>) -> Self {
        Self {
            client_secret_path: client_secret_path.into(),
        }
    }
}

#[async_trait]
impl OAuthFlow for InstalledAppFlow {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let secret = load_client_secret(&self.client_secret_path).await?;
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or_else(|| GmailError::AuthError("Credential has no refresh token".to_string()))?;

        let user_secret = AuthorizedUserSecret {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            refresh_token: refresh_token.clone(),
            key_type: "authorized_user".to_string(),
        };

        let auth = yup_oauth2::AuthorizedUserAuthenticator::builder(user_secret)
            .build()
            .await
            .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        let scopes: Vec<&str> = credential.scopes.iter().map(String::as_str).collect();
        let token = auth
            .token(&scopes)
            .await
            .map_err(|e| GmailError::AuthError(format!("Failed to refresh token: {}", e)))?;

        let access_token = token
            .token()
            .ok_or_else(|| GmailError::AuthError("Refresh returned no access token".to_string()))?
            .to_string();

        Ok(Credential {
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: to_utc(token.expiration_time().map(|t| t.unix_timestamp())),
            scopes: credential.scopes.clone(),
        })
    }

    async fn interactive(&self, scopes: &[String]) -> Result<Credential> {
        let secret = load_client_secret(&self.client_secret_path).await?;
        let captured = CapturedToken::default();

        // HTTPRedirect prints the consent URL to stdout and listens on a
        // loopback port for the redirect; the user opens the URL themselves
        let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .with_storage(Box::new(captured.clone()))
        .build()
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        let scope_refs: Vec<&str> = scopes.iter().map(String::as_str).collect();
        let token = auth
            .token(&scope_refs)
            .await
            .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

        let access_token = token
            .token()
            .ok_or_else(|| GmailError::AuthError("Authorization returned no access token".to_string()))?
            .to_string();

        let info = captured.take();
        let refresh_token = info.as_ref().and_then(|i| i.refresh_token.clone());
        if refresh_token.is_none() {
            warn!("Authorization returned no refresh token; the next run will prompt again");
        }

        // The token response does not say which scopes survived consent
        Ok(Credential {
            access_token,
            refresh_token,
            expires_at: to_utc(token.expiration_time().map(|t| t.unix_timestamp())),
            scopes: scopes.to_vec(),
        })
    }
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; the file inherits the profile directory's
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
