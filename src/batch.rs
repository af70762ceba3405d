//! Bulk deletion through the Drive batch endpoint.
//!
//! Deletes are grouped into `multipart/mixed` batch requests. Each part of the
//! reply carries its own HTTP status: a 404 means the file is already gone and
//! is skipped, any other failure aborts the whole clear.

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{api_error, error_from_body, DriveClient};
use crate::error::{DriveError, Result};
use crate::models::FileEntry;

/// Most sub-requests the Drive batch endpoint accepts at once.
pub const MAX_BATCH_SIZE: usize = 100;

/// Answer of the confirmation hook run before a clear deletes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    Proceed,
    Abort,
}

/// How a clear ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Every file is kept; no delete was sent.
    NothingToDelete,
    /// The confirmation hook declined; no delete was sent.
    Aborted,
    /// Deletes were sent. Files already gone are not counted.
    Deleted(usize),
}

/// Pick the files a clear would delete: everything except the `keep_first`
/// oldest and the `keep_last` newest.
pub fn select_for_deletion(
    mut files: Vec<FileEntry>,
    keep_first: usize,
    keep_last: usize,
) -> Vec<FileEntry> {
    files.sort_by_key(|f| f.created_at);

    let total = files.len();
    if keep_first.saturating_add(keep_last) >= total {
        return Vec::new();
    }

    files.truncate(total - keep_last);
    files.drain(..keep_first);
    files
}

/// One sub-response of a batch reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResponse {
    /// Index of the sub-request this answers, from its `Content-ID`.
    pub item: Option<usize>,
    pub status: u16,
    pub body: String,
}

/// Boundary string for a new batch request.
pub fn new_boundary() -> String {
    format!("batch_{}", Uuid::new_v4().simple())
}

/// Encode delete sub-requests for `ids` as a `multipart/mixed` body.
///
/// `api_path` is the path prefix of the files resource, e.g. `/drive/v3`.
pub fn encode_delete_batch(boundary: &str, api_path: &str, ids: &[String]) -> String {
    let mut body = String::new();
    for (index, id) in ids.iter().enumerate() {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str("Content-Transfer-Encoding: binary\r\n");
        body.push_str(&format!("Content-ID: <item-{}>\r\n\r\n", index));
        body.push_str(&format!("DELETE {}/files/{} HTTP/1.1\r\n\r\n", api_path, id));
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    body
}

/// Extract the `boundary` parameter of a `multipart/mixed` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Split a header block from what follows the first blank line.
fn split_head(text: &str) -> (&str, &str) {
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((index, len)) => (&text[..index], &text[index + len..]),
        None => (text, ""),
    }
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// `<response-item-3>` → 3
fn parse_content_id(value: &str) -> Option<usize> {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}

/// Decode a `multipart/mixed` batch reply into its sub-responses.
pub fn decode_batch_response(boundary: &str, body: &str) -> Result<Vec<PartResponse>> {
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();

    for segment in body.split(delimiter.as_str()).skip(1) {
        if segment.starts_with("--") {
            break;
        }
        let segment = segment.trim_start_matches(['\r', '\n']);
        if segment.trim().is_empty() {
            continue;
        }

        let (outer_head, message) = split_head(segment);
        let item = header_value(outer_head, "Content-ID").and_then(parse_content_id);

        let (inner_head, inner_body) = split_head(message.trim_start_matches(['\r', '\n']));
        let status_line = inner_head.lines().next().unwrap_or_default();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                DriveError::Protocol(format!("bad batch status line: {:?}", status_line))
            })?;

        parts.push(PartResponse {
            item,
            status,
            body: inner_body.trim().to_string(),
        });
    }

    Ok(parts)
}

impl DriveClient {
    /// Delete all files in a folder except the oldest `keep_first` and the
    /// newest `keep_last`.
    ///
    /// # Arguments
    /// * `folder_id` - Folder to clear; the current folder if `None`
    /// * `keep_first` - Number of oldest files to keep
    /// * `keep_last` - Number of newest files to keep
    /// * `confirm` - Called with the files about to be deleted; `Confirm::Abort`
    ///   stops before any delete is sent
    ///
    /// # Returns
    /// How the clear ended, with the number of files deleted if deletes were sent
    pub async fn clear_folder(
        &self,
        folder_id: Option<&str>,
        keep_first: usize,
        keep_last: usize,
        confirm: Option<&mut dyn FnMut(&[FileEntry]) -> Confirm>,
    ) -> Result<ClearOutcome> {
        let files = self.list_files(folder_id).await?;
        let total = files.len();
        let doomed = select_for_deletion(files, keep_first, keep_last);

        if doomed.is_empty() {
            debug!("Nothing to delete ({} files, keeping {} + {})", total, keep_first, keep_last);
            return Ok(ClearOutcome::NothingToDelete);
        }

        if let Some(confirm) = confirm {
            if confirm(doomed.as_slice()) == Confirm::Abort {
                info!("Clear aborted before deleting {} files", doomed.len());
                return Ok(ClearOutcome::Aborted);
            }
        }

        let ids: Vec<String> = doomed.into_iter().map(|f| f.id).collect();
        Ok(ClearOutcome::Deleted(self.delete_batch(&ids).await?))
    }

    /// Delete files through batch requests of at most `MAX_BATCH_SIZE` items.
    ///
    /// Returns the number deleted; missing files are skipped. The first other
    /// failure is returned as an error.
    pub async fn delete_batch(&self, ids: &[String]) -> Result<usize> {
        let mut deleted = 0;

        for group in ids.chunks(MAX_BATCH_SIZE) {
            let parts = self.execute_delete_batch(group).await?;

            for (index, id) in group.iter().enumerate() {
                let part = parts
                    .iter()
                    .find(|p| p.item == Some(index))
                    .or_else(|| parts.get(index).filter(|p| p.item.is_none()))
                    .ok_or_else(|| {
                        DriveError::Protocol(format!("no batch response for {}", id))
                    })?;

                match part.status {
                    200..=299 => deleted += 1,
                    404 => debug!("{} already gone", id),
                    status => return Err(error_from_body(status, &part.body)),
                }
            }
        }

        info!("Deleted {} of {} files", deleted, ids.len());
        Ok(deleted)
    }

    async fn execute_delete_batch(&self, ids: &[String]) -> Result<Vec<PartResponse>> {
        let token = self.token().await?;
        let boundary = new_boundary();
        let body = encode_delete_batch(&boundary, &self.config.api_path(), ids);

        let response = self
            .http
            .post(&self.config.batch_url)
            .bearer_auth(&token)
            .header(
                CONTENT_TYPE,
                format!("multipart/mixed; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let reply_boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type)
            .ok_or_else(|| DriveError::Protocol("batch reply is not multipart".to_string()))?;
        let text = response.text().await?;

        decode_batch_response(&reply_boundary, &text)
    }
}
