//! Data models for Google Drive API responses.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A file stored in a Drive folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub name: String,
    /// Google Docs native files carry no size; they count as zero bytes.
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: u64,
    #[serde(rename = "createdTime")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl FileEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map_err(serde::de::Error::custom),
        None => Ok(0),
    }
}

impl std::fmt::Display for FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            format_date(&self.created_at),
            self.id,
            format_size(self.size),
            self.name
        )
    }
}

/// Format bytes with a binary suffix, e.g. `1.5K` or `20M`.
pub fn format_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "K", "M", "G", "T"];

    if bytes == 0 {
        return format!("0{}", SUFFIXES[0]);
    }

    let mut index = 0;
    let mut scale = 1u64;
    while index + 1 < SUFFIXES.len() && bytes / scale >= 1024 {
        scale *= 1024;
        index += 1;
    }

    let value = format!("{:.1}", bytes as f64 / scale as f64);
    let value = value.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", value, SUFFIXES[index])
}

/// Render a UTC instant in local time.
pub fn format_date(instant: &DateTime<Utc>) -> String {
    instant
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A bare `{ "id": ... }` object.
#[derive(Debug, Deserialize)]
pub struct IdOnly {
    pub id: String,
}

/// Response from a files.list call that only requests ids.
#[derive(Debug, Deserialize)]
pub struct IdListResponse {
    #[serde(default)]
    pub files: Vec<IdOnly>,
}

/// User information from the about API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email_address: Option<String>,
}

/// Storage quota information. Values are decimal strings; `limit` is absent
/// for unlimited accounts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageQuota {
    pub limit: Option<String>,
    pub usage: Option<String>,
}

/// About response from the Drive API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    pub user: User,
    pub storage_quota: StorageQuota,
}

impl About {
    pub fn usage_bytes(&self) -> Option<u64> {
        self.storage_quota.usage.as_deref()?.parse().ok()
    }

    pub fn limit_bytes(&self) -> Option<u64> {
        self.storage_quota.limit.as_deref()?.parse().ok()
    }
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(500), "500B");
        assert_eq!(format_size(1024), "1K");
        assert_eq!(format_size(1536), "1.5K");
        assert_eq!(format_size(1048576), "1M");
        assert_eq!(format_size(1073741824), "1G");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024 * 1024 * 1024), "5120T");
    }

    #[test]
    fn test_file_entry_deserialize() {
        let json = r#"{
            "id": "abc123",
            "name": "backup.tar",
            "size": "1024",
            "createdTime": "2024-03-01T10:20:30.123Z"
        }"#;

        let entry: FileEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "abc123");
        assert_eq!(entry.name, "backup.tar");
        assert_eq!(entry.size, 1024);
        assert_eq!(entry.created_at.timestamp(), 1709288430);
        assert!(!entry.is_folder());
    }

    #[test]
    fn test_file_entry_without_size() {
        let json = r#"{
            "id": "doc1",
            "name": "Notes",
            "createdTime": "2024-03-01T10:20:30Z",
            "mimeType": "application/vnd.google-apps.document"
        }"#;

        let entry: FileEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.size, 0);
    }

    #[test]
    fn test_about_quota() {
        let json = r#"{
            "user": {"emailAddress": "me@example.com"},
            "storageQuota": {"usage": "2048"}
        }"#;

        let about: About = serde_json::from_str(json).unwrap();
        assert_eq!(about.usage_bytes(), Some(2048));
        assert_eq!(about.limit_bytes(), None);
        assert_eq!(about.user.email_address.as_deref(), Some("me@example.com"));
    }
}
