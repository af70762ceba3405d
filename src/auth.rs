//! OAuth2 installed-app credentials for Google APIs.
//!
//! The credential lives in a JSON file (the same `authorized_user` layout the
//! Google client libraries write) readable only by its owner. Access tokens are
//! refreshed through the token endpoint whenever they are stale, and the
//! refreshed credential is written back to disk.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::DriveConfig;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, TokenResponse};

/// Prefix for short scope names such as `drive.file`.
pub const SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";

/// Redirect URI for the copy/paste installed-app flow.
const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Lifetime assumed for an access token issued without `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A user's OAuth2 credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token", default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

/// What a credential is good for at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Valid,
    NeedsRefresh,
    Expired,
    Invalid,
}

impl Credential {
    pub fn state_at(&self, now: DateTime<Utc>) -> CredentialState {
        let fresh = match self.expiry {
            Some(expiry) => expiry > now + Duration::seconds(EXPIRY_BUFFER_SECS),
            // A token with no expiry and nothing to refresh it with is used as is.
            None => self.refresh_token.is_none(),
        };

        if self.access_token.is_some() && fresh {
            CredentialState::Valid
        } else if self.refresh_token.is_some() {
            CredentialState::NeedsRefresh
        } else if self.expiry.is_some() {
            CredentialState::Expired
        } else {
            CredentialState::Invalid
        }
    }

    pub fn state(&self) -> CredentialState {
        self.state_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        self.state() == CredentialState::Valid
    }
}

/// When a token issued now stops being usable.
fn token_expiry(expires_in: Option<i64>) -> DateTime<Utc> {
    let lifetime = expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Utc::now() + Duration::seconds(lifetime)
}

/// Expand short scope names (`drive.file`) into full scope URLs.
pub fn expand_scopes<S: AsRef<str>>(scopes: &[S]) -> Vec<String> {
    scopes
        .iter()
        .map(|s| {
            let s = s.as_ref();
            if s.starts_with("https://") {
                s.to_string()
            } else {
                format!("{}{}", SCOPE_PREFIX, s)
            }
        })
        .collect()
}

/// Reads and writes the credential file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored credential. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<Credential>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let credential: Credential = serde_json::from_str(&content)?;
        Ok(Some(credential))
    }

    /// Write the credential with owner-only permissions.
    pub fn save(&self, credential: &Credential) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(credential)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path)?;
        // mode() only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(json.as_bytes())?;
        file.flush()?;

        debug!("Saved credentials to {}", self.path.display());
        Ok(self.path.clone())
    }
}

/// OAuth client registration used for the consent flow.
#[derive(Debug, Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

/// Talks to Google's OAuth2 endpoints.
#[derive(Debug, Clone)]
pub struct AuthorizationProvider {
    http: Client,
    auth_uri: String,
    token_uri: String,
}

impl AuthorizationProvider {
    pub fn new(http: Client, config: &DriveConfig) -> Self {
        Self {
            http,
            auth_uri: config.auth_uri.clone(),
            token_uri: config.token_uri.clone(),
        }
    }

    /// URL the user opens to grant access.
    pub fn authorization_url(&self, client: &ClientSecrets, scopes: &[String]) -> Result<String> {
        let scope = scopes.join(" ");
        let url = reqwest::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", client.client_id.as_str()),
                ("redirect_uri", OOB_REDIRECT_URI),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| DriveError::Authorization(format!("bad authorization URI: {}", e)))?;
        Ok(url.to_string())
    }

    /// Exchange the code pasted by the user for a credential.
    pub async fn exchange_code(
        &self,
        client: &ClientSecrets,
        code: &str,
        scopes: &[String],
    ) -> Result<Credential> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", OOB_REDIRECT_URI),
        ];
        let token = self.request_token(&self.token_uri, &params).await?;

        Ok(Credential {
            access_token: Some(token.access_token),
            refresh_token: token.refresh_token,
            token_uri: self.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: match token.scope {
                Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
                None => scopes.to_vec(),
            },
            expiry: Some(token_expiry(token.expires_in)),
        })
    }

    /// Obtain a fresh access token using the credential's refresh token.
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| DriveError::Authorization("no refresh token".to_string()))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
        ];
        let token = self.request_token(&credential.token_uri, &params).await?;

        let mut refreshed = credential.clone();
        refreshed.access_token = Some(token.access_token);
        if let Some(rotated) = token.refresh_token {
            refreshed.refresh_token = Some(rotated);
        }
        refreshed.expiry = Some(token_expiry(token.expires_in));
        Ok(refreshed)
    }

    async fn request_token(
        &self,
        token_uri: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let response = self
            .http
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    DriveError::Authorization("offline".to_string())
                } else {
                    DriveError::HttpError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_error) => api_error.error.message,
                Err(_) => body,
            };
            return Err(DriveError::Authorization(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                reason.trim()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Hands out access tokens, loading and refreshing the stored credential.
#[derive(Clone)]
pub struct Authenticator {
    store: TokenStore,
    provider: AuthorizationProvider,
    credential: Arc<RwLock<Option<Credential>>>,
}

impl Authenticator {
    pub fn new(store: TokenStore, provider: AuthorizationProvider) -> Self {
        Self {
            store,
            provider,
            credential: Arc::new(RwLock::new(None)),
        }
    }

    pub fn credentials_path(&self) -> &Path {
        self.store.path()
    }

    /// Ensure a usable credential exists, refreshing it if needed.
    pub async fn initialize(&self) -> Result<()> {
        self.get_access_token().await.map(|_| ())
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.credential.read().await;
            if let Some(credential) = cached.as_ref() {
                if credential.state() == CredentialState::Valid {
                    if let Some(token) = &credential.access_token {
                        return Ok(token.clone());
                    }
                }
            }
        }

        let mut cached = self.credential.write().await;
        let credential = match cached.take() {
            Some(credential) => credential,
            None => self
                .store
                .load()?
                .ok_or_else(|| DriveError::Authorization("credentials absent".to_string()))?,
        };

        let credential = match credential.state() {
            CredentialState::Valid => credential,
            CredentialState::NeedsRefresh => {
                info!("Access token expired, refreshing");
                let refreshed = self.provider.refresh(&credential).await?;
                self.store.save(&refreshed)?;
                refreshed
            }
            CredentialState::Expired => {
                return Err(DriveError::Authorization("credentials expired".to_string()))
            }
            CredentialState::Invalid => {
                return Err(DriveError::Authorization("credentials invalid".to_string()))
            }
        };

        let token = credential
            .access_token
            .clone()
            .ok_or_else(|| DriveError::Authorization("credentials invalid".to_string()))?;
        *cached = Some(credential);
        Ok(token)
    }
}
