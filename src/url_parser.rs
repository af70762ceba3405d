//! Accept Drive share links wherever a file or folder ID is expected.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{DriveError, Result};

/// Link shapes that carry an ID, tried in order. Group 1 is the ID.
static LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // drive.google.com/drive/folders/<ID>, optionally under /u/<n>/
        r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)",
        // drive.google.com/file/d/<ID>/view and docs.google.com/<kind>/d/<ID>/edit
        r"^https?://(?:drive|docs)\.google\.com/(?:[a-z]+/)?d/([a-zA-Z0-9_-]+)",
        // drive.google.com/open?id=<ID> and drive.google.com/uc?id=<ID>&export=download
        r"^https?://drive\.google\.com/(?:open|uc)\?(?:[^#]*&)?id=([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid link regex"))
    .collect()
});

static RAW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Return the Drive ID named by a share link, or the input itself if it
/// already is a bare ID.
///
/// # Examples
///
/// ```
/// use folder_drive::url_parser::extract_id;
///
/// let id = extract_id("https://drive.google.com/file/d/1abc123/view").unwrap();
/// assert_eq!(id, "1abc123");
///
/// let id = extract_id("1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// ```
pub fn extract_id(link_or_id: &str) -> Result<String> {
    let trimmed = link_or_id.trim();

    let from_link = LINK_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(trimmed)?.get(1));
    if let Some(id) = from_link {
        return Ok(id.as_str().to_string());
    }

    if RAW_ID.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(DriveError::InvalidUrlOrId(link_or_id.to_string()))
}
