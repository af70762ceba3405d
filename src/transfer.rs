//! Chunked, resumable upload and download of single files.
//!
//! Both directions move the file in chunks whose size is a multiple of
//! 256 KiB. Each chunk is acknowledged before the next one is sent, and a
//! chunk that fails transiently is attempted once more before the transfer
//! gives up. Nothing is persisted between runs: an interrupted upload leaves
//! an orphaned session on the server and an interrupted download leaves a
//! partial file at the destination.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::client::{api_error, DriveClient};
use crate::error::{DriveError, Result};
use crate::models::{FileEntry, IdOnly};

/// Chunk sizes are multiples of this many bytes.
pub const CHUNK_ALIGNMENT: u64 = 262_144;

/// Chunk size used when the caller passes no hint.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_048_576;

/// Extra attempts granted to a chunk after a transient failure.
pub const CHUNK_RETRIES: u32 = 1;

/// Round a chunk size hint up to the next multiple of 256 KiB.
///
/// A hint of zero selects the 1 MiB default.
pub fn aligned_chunk_size(hint: u64) -> u64 {
    let hint = if hint == 0 { DEFAULT_CHUNK_SIZE } else { hint };
    hint.div_ceil(CHUNK_ALIGNMENT).saturating_mul(CHUNK_ALIGNMENT)
}

/// Progress of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    pub total_size: u64,
    pub chunk_size: u64,
    pub bytes_transferred: u64,
    pub done: bool,
}

impl TransferSession {
    pub fn new(total_size: u64, chunk_size_hint: u64) -> Self {
        Self {
            total_size,
            chunk_size: aligned_chunk_size(chunk_size_hint),
            bytes_transferred: 0,
            done: false,
        }
    }

    /// Byte range `[start, end)` of the next chunk.
    pub fn next_range(&self) -> (u64, u64) {
        let start = self.bytes_transferred;
        let end = start.saturating_add(self.chunk_size).min(self.total_size);
        (start, end)
    }

    /// Record that the remote side holds the first `offset` bytes.
    pub fn acknowledge(&mut self, offset: u64) -> Result<()> {
        if offset < self.bytes_transferred {
            return Err(DriveError::Protocol(format!(
                "acknowledged offset went backwards ({} < {})",
                offset, self.bytes_transferred
            )));
        }
        if offset > self.total_size {
            return Err(DriveError::Protocol(format!(
                "acknowledged offset {} exceeds file size {}",
                offset, self.total_size
            )));
        }
        self.bytes_transferred = offset;
        Ok(())
    }

    pub fn complete(&mut self) {
        self.bytes_transferred = self.total_size;
        self.done = true;
    }

    /// Fraction of the file acknowledged so far, in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.done {
            return 1.0;
        }
        if self.total_size == 0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / self.total_size as f64
    }
}

/// Forwards progress to an optional callback, never going backwards and
/// reporting completion only once.
struct ProgressReporter<'a> {
    callback: Option<&'a mut dyn FnMut(f64)>,
    last: f64,
    finished: bool,
}

impl<'a> ProgressReporter<'a> {
    fn new(callback: Option<&'a mut dyn FnMut(f64)>) -> Self {
        Self {
            callback,
            last: 0.0,
            finished: false,
        }
    }

    fn report(&mut self, session: &TransferSession) {
        let fraction = session.fraction().clamp(0.0, 1.0);
        if self.finished || fraction < self.last {
            return;
        }
        // Completion is reported by the final acknowledgement only.
        if fraction >= 1.0 && !session.done {
            return;
        }
        self.last = fraction;
        self.finished = session.done;
        if let Some(callback) = self.callback.as_mut() {
            callback(fraction);
        }
    }
}

/// Server reply to one upload chunk.
#[derive(Debug, PartialEq, Eq)]
enum ChunkReply {
    /// The server holds this many leading bytes and wants more.
    Incomplete(u64),
    /// Upload finished; the new file's ID.
    Complete(String),
}

/// Parse the `Range: bytes=0-N` header of a `308` reply into a byte count.
fn parse_received(range: Option<&str>) -> Result<u64> {
    let Some(range) = range else {
        return Ok(0);
    };
    let last = range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split('-').nth(1))
        .and_then(|end| end.trim().parse::<u64>().ok())
        .ok_or_else(|| DriveError::Protocol(format!("bad Range header: {}", range)))?;
    Ok(last + 1)
}

/// Run `op`, granting it one more attempt after a transient failure.
async fn with_retry<T, F, Fut>(what: &str, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < CHUNK_RETRIES => {
                attempt += 1;
                warn!("{} failed: {}. Retrying ({}/{})", what, e, attempt, CHUNK_RETRIES);
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Where a download lands: inside `destination` if it is a directory, at
/// `destination` otherwise, or under the remote name in the current directory.
pub fn destination_path(remote_name: &str, destination: Option<&Path>) -> PathBuf {
    let file_name = remote_name.replace(['/', '\\'], "_");
    match destination {
        Some(path) if !path.as_os_str().is_empty() => {
            if path.is_dir() {
                path.join(file_name)
            } else {
                path.to_path_buf()
            }
        }
        _ => PathBuf::from(file_name),
    }
}

impl DriveClient {
    /// Upload a local file with a resumable session.
    ///
    /// # Arguments
    /// * `local_path` - Path to the local file
    /// * `remote_name` - Name on Drive; the local base name if `None`
    /// * `parent_id` - Destination folder; the current folder if `None`
    /// * `chunk_size_hint` - Bytes per chunk, rounded up to 256 KiB (0 = 1 MiB)
    /// * `on_progress` - Called with the acknowledged fraction after each chunk
    ///
    /// Returns the ID of the new file.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: Option<&str>,
        parent_id: Option<&str>,
        chunk_size_hint: u64,
        on_progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<String> {
        let name = match remote_name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    DriveError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("no file name in {}", local_path.display()),
                    ))
                })?,
        };
        let parent_id = match parent_id {
            Some(id) => id.to_string(),
            None => self.set_current_folder(None).await?,
        };

        let mut file = File::open(local_path).await?;
        let total_size = file.metadata().await?.len();
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        let mut session = TransferSession::new(total_size, chunk_size_hint);
        let mut progress = ProgressReporter::new(on_progress);
        info!(
            "Uploading {} as {:?} ({} bytes, {} byte chunks)",
            local_path.display(),
            name,
            total_size,
            session.chunk_size
        );

        let session_uri = with_retry("Starting upload", self.config.retry_delay, || {
            self.start_upload(&name, &parent_id, &mime_type, total_size)
        })
        .await?;
        debug!("Upload session: {}", session_uri);

        loop {
            let (start, end) = session.next_range();
            let mut chunk = vec![0u8; (end - start) as usize];
            if !chunk.is_empty() {
                file.seek(SeekFrom::Start(start)).await?;
                file.read_exact(&mut chunk).await?;
            }

            let what = format!("Upload of bytes {}-{}", start, end);
            let reply = with_retry(&what, self.config.retry_delay, || {
                self.put_chunk(&session_uri, &mime_type, start, &chunk, total_size)
            })
            .await?;

            match reply {
                ChunkReply::Incomplete(received) => {
                    if chunk.is_empty() || received <= start {
                        return Err(DriveError::Protocol(format!(
                            "upload stalled at byte {}",
                            received
                        )));
                    }
                    session.acknowledge(received)?;
                    progress.report(&session);
                }
                ChunkReply::Complete(id) => {
                    session.complete();
                    progress.report(&session);
                    info!("Uploaded {:?} as {}", name, id);
                    return Ok(id);
                }
            }
        }
    }

    /// Open a resumable upload session and return its URI.
    async fn start_upload(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        total_size: u64,
    ) -> Result<String> {
        let token = self.token().await?;
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
        });

        let response = self
            .http
            .post(format!("{}/files", self.config.upload_base))
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", total_size.to_string())
            .json(&metadata)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DriveError::Protocol("no upload URL in response".to_string()))
    }

    /// Send one chunk. An empty chunk finalizes the upload.
    async fn put_chunk(
        &self,
        session_uri: &str,
        mime_type: &str,
        start: u64,
        chunk: &[u8],
        total_size: u64,
    ) -> Result<ChunkReply> {
        let token = self.token().await?;
        let content_range = if chunk.is_empty() {
            format!("bytes */{}", total_size)
        } else {
            format!("bytes {}-{}/{}", start, start + chunk.len() as u64 - 1, total_size)
        };

        let response = self
            .http
            .put(session_uri)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, mime_type)
            .header(CONTENT_RANGE, content_range)
            .body(chunk.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::PERMANENT_REDIRECT {
            let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
            return Ok(ChunkReply::Incomplete(parse_received(range)?));
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        let created: IdOnly = response.json().await?;
        Ok(ChunkReply::Complete(created.id))
    }

    /// Download a file by ID in ranged chunks.
    ///
    /// # Arguments
    /// * `file_id` - The ID of the file to download
    /// * `destination` - File or directory to save into; the remote name in
    ///   the current directory if `None`
    /// * `chunk_size_hint` - Bytes per chunk, rounded up to 256 KiB (0 = 1 MiB)
    /// * `on_progress` - Called with the received fraction after each chunk
    ///
    /// Returns the path written. A file the API reports as missing fails with
    /// `DriveError::NotFound`.
    pub async fn download_file(
        &self,
        file_id: &str,
        destination: Option<&Path>,
        chunk_size_hint: u64,
        on_progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<PathBuf> {
        let metadata = self
            .get_file(file_id)
            .await?
            .found_or(format!("file {}", file_id))?;
        self.download_entry(&metadata, destination, chunk_size_hint, on_progress)
            .await
    }

    /// Download a file whose metadata is already known.
    pub async fn download_entry(
        &self,
        metadata: &FileEntry,
        destination: Option<&Path>,
        chunk_size_hint: u64,
        on_progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<PathBuf> {
        let file_id = metadata.id.as_str();
        let path = destination_path(&metadata.name, destination);

        let mut session = TransferSession::new(metadata.size, chunk_size_hint);
        let mut progress = ProgressReporter::new(on_progress);
        info!(
            "Downloading {:?} to {} ({} bytes, {} byte chunks)",
            metadata.name,
            path.display(),
            metadata.size,
            session.chunk_size
        );

        let mut file = File::create(&path).await?;

        while session.bytes_transferred < session.total_size {
            let (start, end) = session.next_range();
            let mut attempt = 0;
            let written = loop {
                match self.download_chunk(file_id, &mut file, start, end).await {
                    Ok(written) => break written,
                    Err(e) if e.is_transient() && attempt < CHUNK_RETRIES => {
                        attempt += 1;
                        warn!(
                            "Download of bytes {}-{} failed: {}. Retrying ({}/{})",
                            start, end, e, attempt, CHUNK_RETRIES
                        );
                        tokio::time::sleep(self.config.retry_delay).await;
                        // Drop whatever part of the chunk made it to disk.
                        file.set_len(start).await?;
                        file.seek(SeekFrom::Start(start)).await?;
                    }
                    Err(e) => return Err(e),
                }
            };

            if written == 0 {
                return Err(DriveError::Protocol(format!(
                    "empty response for bytes {}-{}",
                    start, end
                )));
            }
            session.acknowledge(start + written)?;
            if session.bytes_transferred == session.total_size {
                session.complete();
            }
            progress.report(&session);
        }

        file.flush().await?;
        if !session.done {
            session.complete();
            progress.report(&session);
        }

        info!("Saved {}", path.display());
        Ok(path)
    }

    /// Fetch bytes `[start, end)` and append them to `file`.
    async fn download_chunk(
        &self,
        file_id: &str,
        file: &mut File,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        let token = self.token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}", self.config.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .header(RANGE, format!("bytes={}-{}", start, end - 1))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(response).await);
        }
        if status != StatusCode::PARTIAL_CONTENT && start > 0 {
            return Err(DriveError::Protocol(format!(
                "server ignored range request at byte {}",
                start
            )));
        }

        // Stream to file
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        Ok(written)
    }
}
