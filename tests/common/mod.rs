//! Shared fixtures for tests that talk to a mock Drive server.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use folder_drive::{AuthorizationProvider, Authenticator, DriveClient, DriveConfig, TokenStore};
use mockito::ServerGuard;
use serde_json::{json, Value};

pub const ACCESS_TOKEN: &str = "test-token";
pub const BEARER: &str = "Bearer test-token";

/// Credential whose access token is good for years.
pub fn valid_credential(token_uri: &str) -> Value {
    json!({
        "token": ACCESS_TOKEN,
        "refresh_token": "test-refresh",
        "token_uri": token_uri,
        "client_id": "test-client",
        "client_secret": "test-secret",
        "scopes": ["https://www.googleapis.com/auth/drive.file"],
        "expiry": "2099-01-01T00:00:00Z"
    })
}

pub fn write_credential(dir: &Path, credential: &Value) -> PathBuf {
    let path = dir.join(".drivecredentials");
    std::fs::write(&path, serde_json::to_vec_pretty(credential).unwrap()).unwrap();
    path
}

pub fn client_with_store(server: &ServerGuard, path: &Path, folder: &str) -> DriveClient {
    let config = DriveConfig::with_base_url(&server.url());
    let http = config.build_http_client().unwrap();
    let auth = Authenticator::new(
        TokenStore::new(path),
        AuthorizationProvider::new(http.clone(), &config),
    );
    DriveClient::new(auth, http, config, folder)
}

/// A client for `server` holding a valid credential in `dir`.
pub fn client(server: &ServerGuard, dir: &Path) -> DriveClient {
    let token_uri = format!("{}/token", server.url());
    let path = write_credential(dir, &valid_credential(&token_uri));
    client_with_store(server, &path, "Backups")
}

pub fn file_json(id: &str, size: u64, created: &str) -> Value {
    json!({
        "id": id,
        "name": format!("{}.tar", id),
        "size": size.to_string(),
        "createdTime": created,
        "mimeType": "application/x-tar"
    })
}

pub fn files_body(files: &[Value]) -> String {
    json!({ "files": files }).to_string()
}
