//! Remote endpoints and client construction.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;

use crate::error::Result;

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Batch endpoint for Google Drive API.
pub const BATCH_URL: &str = "https://www.googleapis.com/batch/drive/v3";

/// Google OAuth2 consent page.
pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Default name of the credentials file placed beside the executable.
pub const CREDENTIALS_FILE_NAME: &str = ".drivecredentials";

/// Endpoints and tuning for one drive session.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub api_base: String,
    pub upload_base: String,
    pub batch_url: String,
    pub auth_uri: String,
    pub token_uri: String,
    /// Pause before the single retry of a failed chunk.
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
            batch_url: BATCH_URL.to_string(),
            auth_uri: AUTH_URI.to_string(),
            token_uri: TOKEN_URI.to_string(),
            retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl DriveConfig {
    /// Point every endpoint at one server, e.g. a mock in tests.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{}/drive/v3", base),
            upload_base: format!("{}/upload/drive/v3", base),
            batch_url: format!("{}/batch/drive/v3", base),
            auth_uri: format!("{}/o/oauth2/auth", base),
            token_uri: format!("{}/token", base),
            retry_delay: Duration::ZERO,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn build_http_client(&self) -> Result<Client> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(self.connect_timeout)
            .build()?;
        Ok(client)
    }

    /// Path component of the API base, used to address batch sub-requests.
    pub fn api_path(&self) -> String {
        match reqwest::Url::parse(&self.api_base) {
            Ok(url) => url.path().trim_end_matches('/').to_string(),
            Err(_) => "/drive/v3".to_string(),
        }
    }
}

/// Default credentials location: a dotfile in the executable's directory.
pub fn default_credentials_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CREDENTIALS_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(CREDENTIALS_FILE_NAME))
}
