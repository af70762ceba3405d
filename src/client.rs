//! Google Drive API client: folder resolution, listing and single-file calls.

use reqwest::{Client, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::config::DriveConfig;
use crate::error::{DriveError, Lookup, Result};
use crate::models::{
    About, ApiErrorResponse, FileEntry, FileListResponse, IdListResponse, IdOnly,
    FOLDER_MIME_TYPE,
};

/// Largest page the files.list endpoint serves.
pub const DEFAULT_LIST_LIMIT: u32 = 999;

/// Fields requested for every file entry.
pub(crate) const FILE_FIELDS: &str = "id,name,size,createdTime,mimeType";

/// The session's active folder. `id` is filled in on first resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHandle {
    pub name: String,
    pub id: Option<String>,
}

/// Client for one user's Drive, scoped to a current folder.
///
/// The folder cache is per client; two clients resolving the same unseen
/// name may each create a folder.
pub struct DriveClient {
    auth: Authenticator,
    pub(crate) http: Client,
    pub(crate) config: DriveConfig,
    folder: Mutex<FolderHandle>,
}

impl DriveClient {
    /// Create a new DriveClient.
    ///
    /// # Arguments
    /// * `auth` - Authenticator for obtaining access tokens
    /// * `http` - HTTP client shared with the authenticator
    /// * `config` - Remote endpoints
    /// * `folder` - Name of the current remote folder
    pub fn new(
        auth: Authenticator,
        http: Client,
        config: DriveConfig,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            http,
            config,
            folder: Mutex::new(FolderHandle {
                name: folder.into(),
                id: None,
            }),
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Snapshot of the current folder handle.
    pub async fn current_folder(&self) -> FolderHandle {
        self.folder.lock().await.clone()
    }

    pub(crate) async fn token(&self) -> Result<String> {
        self.auth.get_access_token().await
    }

    /// Look up a non-trashed folder by exact name. The first match wins.
    pub async fn find_folder(&self, name: &str) -> Result<Lookup<String>> {
        let token = self.token().await?;
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(name),
            FOLDER_MIME_TYPE
        );

        let response = self
            .http
            .get(format!("{}/files", self.config.api_base))
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("pageSize", "1"), ("fields", "files(id)")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let list: IdListResponse = response.json().await?;
        Ok(match list.files.into_iter().next() {
            Some(folder) => Lookup::Found(folder.id),
            None => Lookup::NotFound,
        })
    }

    /// Create a folder and return its ID.
    pub async fn create_folder(&self, name: &str) -> Result<String> {
        let token = self.token().await?;
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });

        let response = self
            .http
            .post(format!("{}/files", self.config.api_base))
            .bearer_auth(&token)
            .query(&[("fields", "id")])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let created: IdOnly = response.json().await?;
        info!("Created remote folder {:?} ({})", name, created.id);
        Ok(created.id)
    }

    /// Return the ID of the named folder, creating the folder if absent.
    pub async fn resolve_folder(&self, name: &str) -> Result<String> {
        match self.find_folder(name).await? {
            Lookup::Found(id) => {
                debug!("Resolved folder {:?} to {}", name, id);
                Ok(id)
            }
            Lookup::NotFound => self.create_folder(name).await,
        }
    }

    /// Resolve the current folder, or switch to `name` and resolve that.
    ///
    /// The resolved ID is cached until a different name is requested.
    pub async fn set_current_folder(&self, name: Option<&str>) -> Result<String> {
        let mut folder = self.folder.lock().await;
        let requested = name.unwrap_or(folder.name.as_str()).to_string();

        if requested == folder.name {
            if let Some(id) = &folder.id {
                return Ok(id.clone());
            }
        }

        let id = self.resolve_folder(&requested).await?;
        *folder = FolderHandle {
            name: requested,
            id: Some(id.clone()),
        };
        Ok(id)
    }

    /// List files in a folder (the current folder if `None`), oldest first.
    pub async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<FileEntry>> {
        let folder_id = match folder_id {
            Some(id) => id.to_string(),
            None => self.set_current_folder(None).await?,
        };
        self.list_files_limit(&folder_id, DEFAULT_LIST_LIMIT).await
    }

    /// List up to `limit` non-folder, non-trashed files in a folder, oldest first.
    ///
    /// A folder the API reports as missing lists as empty.
    pub async fn list_files_limit(&self, folder_id: &str, limit: u32) -> Result<Vec<FileEntry>> {
        let token = self.token().await?;
        let query = format!(
            "mimeType != '{}' and '{}' in parents and trashed = false",
            FOLDER_MIME_TYPE,
            escape_query(folder_id)
        );
        let fields = format!("files({})", FILE_FIELDS);
        let page_size = limit.to_string();

        let response = self
            .http
            .get(format!("{}/files", self.config.api_base))
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("pageSize", page_size.as_str()),
                ("orderBy", "createdTime"),
                ("fields", fields.as_str()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Folder {} not found, listing as empty", folder_id);
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let list: FileListResponse = response.json().await?;
        let mut files: Vec<FileEntry> = list.files.into_iter().filter(|f| !f.is_folder()).collect();
        files.sort_by_key(|f| f.created_at);
        Ok(files)
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &str) -> Result<Lookup<FileEntry>> {
        let token = self.token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}", self.config.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(Lookup::Found(response.json().await?))
    }

    /// Delete a file by ID.
    pub async fn delete_file(&self, file_id: &str) -> Result<Lookup<()>> {
        let token = self.token().await?;

        let response = self
            .http
            .delete(format!("{}/files/{}", self.config.api_base, file_id))
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        info!("Deleted {}", file_id);
        Ok(Lookup::Found(()))
    }

    /// Account e-mail and storage quota.
    pub async fn about(&self) -> Result<About> {
        let token = self.token().await?;

        let response = self
            .http
            .get(format!("{}/about", self.config.api_base))
            .bearer_auth(&token)
            .query(&[("fields", "user(emailAddress),storageQuota(limit,usage)")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(response.json().await?)
    }
}

/// Escape a value for use inside a single-quoted Drive query string.
pub fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Turn a non-success response into `DriveError::ApiError`.
pub(crate) async fn api_error(response: Response) -> DriveError {
    let status = response.status();
    let error_body = response.text().await.unwrap_or_default();
    error_from_body(status.as_u16(), &error_body)
}

pub(crate) fn error_from_body(status: u16, body: &str) -> DriveError {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(body) {
        return DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        };
    }
    DriveError::ApiError {
        status,
        message: body.trim().to_string(),
    }
}
