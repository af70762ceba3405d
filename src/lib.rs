//! folder_drive - Keep files in one Google Drive folder from the command line.
//!
//! This library provides functionality to:
//! - Authorize a Google account and keep its refreshable credential on disk
//! - Resolve (or create) the working folder by name
//! - List, upload, download and delete files in that folder
//! - Clear the folder while keeping the oldest and/or newest files
//!
//! Uploads and downloads move data in 256 KiB-aligned chunks, retrying a
//! failed chunk once. Bulk deletes go through the Drive batch endpoint.
//!
//! # Example
//!
//! ```no_run
//! use folder_drive::{AuthorizationProvider, Authenticator, DriveClient, DriveConfig, TokenStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DriveConfig::default();
//!     let http = config.build_http_client()?;
//!     let auth = Authenticator::new(
//!         TokenStore::new(".drivecredentials"),
//!         AuthorizationProvider::new(http.clone(), &config),
//!     );
//!     let client = DriveClient::new(auth, http, config, "Backups");
//!
//!     for file in client.list_files(None).await? {
//!         println!("{}", file);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod transfer;
pub mod url_parser;

// Re-exports for convenience
pub use auth::{AuthorizationProvider, Authenticator, ClientSecrets, Credential, TokenStore};
pub use batch::{ClearOutcome, Confirm};
pub use client::{DriveClient, FolderHandle};
pub use config::DriveConfig;
pub use error::{DriveError, Lookup, Result};
pub use models::FileEntry;
pub use transfer::{aligned_chunk_size, TransferSession};
pub use url_parser::extract_id;
