//! folder_drive CLI - Manage files in one Google Drive folder.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm as Prompt, Input};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use folder_drive::auth::expand_scopes;
use folder_drive::config::default_credentials_path;
use folder_drive::models::{format_date, format_size};
use folder_drive::{
    extract_id, AuthorizationProvider, Authenticator, ClearOutcome, ClientSecrets, Confirm,
    DriveClient, DriveConfig, DriveError, FileEntry, Lookup, TokenStore,
};

/// CLI tool for keeping files in a single Google Drive folder.
#[derive(Parser)]
#[command(name = "folder_drive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the saved OAuth credentials (default: .drivecredentials beside the program).
    #[arg(long, env = "DRIVE_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Name of the remote folder to work in.
    #[arg(long, env = "DRIVE_FOLDER", default_value = "Backups")]
    folder: String,

    /// OAuth client ID, needed by `auth`.
    #[arg(long, env = "DRIVE_CLIENT_ID")]
    client_id: Option<String>,

    /// OAuth client secret, needed by `auth`.
    #[arg(long, env = "DRIVE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show common information.
    Status,

    /// Authorize a Google account and save credentials.
    Auth {
        /// Permission scope (short names get the googleapis prefix).
        #[arg(long, default_values_t = vec!["drive.file".to_string()])]
        scope: Vec<String>,
    },

    /// Show files in the current remote folder.
    List,

    /// Upload a file to the current remote folder.
    Upload {
        /// Local file to upload.
        path: PathBuf,

        /// Name on Drive (default: the local file name).
        name: Option<String>,
    },

    /// Download a file by ID.
    Download {
        /// File URL or ID to download.
        file: String,

        /// Local destination path (file or directory).
        path: Option<PathBuf>,
    },

    /// Delete a file by ID.
    Delete {
        /// File URL or ID to delete.
        file: String,
    },

    /// Delete all files in a folder (the current folder by default).
    Clear {
        /// Folder URL or ID.
        folder: Option<String>,

        /// Do not delete the N oldest files.
        #[arg(long, default_value_t = 0)]
        keep_first: usize,

        /// Do not delete the N newest files.
        #[arg(long, default_value_t = 0)]
        keep_last: usize,

        /// Automatic yes to prompts.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = DriveConfig::default();
    let http = config.build_http_client()?;
    let provider = AuthorizationProvider::new(http.clone(), &config);
    let store = TokenStore::new(cli.credentials.clone().unwrap_or_else(default_credentials_path));
    let auth = Authenticator::new(store.clone(), provider.clone());
    let client = DriveClient::new(auth, http, config, cli.folder.clone());

    match cli.command {
        Commands::Status => cmd_status(&client).await,
        Commands::Auth { scope } => {
            let secrets = client_secrets(cli.client_id.as_deref(), cli.client_secret.as_deref())?;
            cmd_auth(&secrets, &scope, &provider, &store).await
        }
        Commands::List => cmd_list(&client).await,
        Commands::Upload { path, name } => cmd_upload(&client, &path, name.as_deref()).await,
        Commands::Download { file, path } => cmd_download(&client, &file, path).await,
        Commands::Delete { file } => cmd_delete(&client, &file).await,
        Commands::Clear {
            folder,
            keep_first,
            keep_last,
            yes,
        } => cmd_clear(&client, folder.as_deref(), keep_first, keep_last, yes).await,
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("folder_drive={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn cmd_status(client: &DriveClient) -> Result<()> {
    let folder = client.current_folder().await;
    let mut rows = vec![
        row(["Service:", "Google Drive"]),
        row(["Current remote folder:", folder.name.as_str()]),
        row([
            "Credentials file:",
            client.authenticator().credentials_path().display().to_string().as_str(),
        ]),
    ];

    match client.authenticator().initialize().await {
        Err(e @ DriveError::Authorization(_)) => {
            rows.push(row(["Authorization:", e.to_string().as_str()]))
        }
        Err(e) => return Err(e).context("Failed to load credentials"),
        Ok(()) => {
            rows.push(row(["Authorization:", "Authorized"]));
            let about = client.about().await.context("Failed to read account info")?;
            let email = about.user.email_address.clone().unwrap_or_else(|| "-".to_string());
            let usage = about.usage_bytes().map(format_size).unwrap_or_else(|| "-".to_string());
            let limit = about
                .limit_bytes()
                .map(format_size)
                .unwrap_or_else(|| "Unlimited".to_string());
            rows.push(row(["Account:", email.as_str()]));
            rows.push(row(["Usage:", usage.as_str()]));
            rows.push(row(["Limit:", limit.as_str()]));
        }
    }

    println!("{}", table(&rows, &[]));
    Ok(())
}

fn client_secrets(client_id: Option<&str>, client_secret: Option<&str>) -> Result<ClientSecrets> {
    match (client_id, client_secret) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok(ClientSecrets {
            client_id: id.to_string(),
            client_secret: secret.to_string(),
        }),
        _ => bail!(
            "--client-id and --client-secret (or DRIVE_CLIENT_ID and DRIVE_CLIENT_SECRET) \
             are required"
        ),
    }
}

async fn cmd_auth(
    secrets: &ClientSecrets,
    scopes: &[String],
    provider: &AuthorizationProvider,
    store: &TokenStore,
) -> Result<()> {
    let scopes = expand_scopes(scopes);

    let url = provider.authorization_url(secrets, &scopes)?;
    println!("Go to the following link in your browser:\n\n    {}\n", url);

    let code: String = Input::new()
        .with_prompt("Enter verification code")
        .interact_text()
        .context("Failed to read verification code")?;

    let credential = provider
        .exchange_code(secrets, &code, &scopes)
        .await
        .context("Failed to exchange verification code")?;
    let path = store.save(&credential)?;
    println!("Credentials saved to {}", path.display());
    Ok(())
}

async fn cmd_list(client: &DriveClient) -> Result<()> {
    client.authenticator().initialize().await?;
    let files = client.list_files(None).await.context("Failed to list files")?;

    if files.is_empty() {
        println!("No files");
        return Ok(());
    }

    let mut rows = vec![row(["Created", "ID", "Size", "Name"])];
    for file in &files {
        rows.push(row([
            format_date(&file.created_at).as_str(),
            file.id.as_str(),
            format_size(file.size).as_str(),
            file.name.as_str(),
        ]));
    }
    println!("{}", table(&rows, &[2]));
    Ok(())
}

async fn cmd_upload(client: &DriveClient, path: &Path, name: Option<&str>) -> Result<()> {
    client.authenticator().initialize().await?;
    let size = std::fs::metadata(path)
        .with_context(|| format!("Cannot read {}", path.display()))?
        .len();

    println!("Uploading {}", path.display());
    let bar = percent_bar();
    let mut on_progress = |fraction: f64| bar.set_position((fraction * 100.0) as u64);

    let id = client
        .upload_file(path, name, None, size / 10, Some(&mut on_progress))
        .await
        .with_context(|| format!("Failed to upload {}", path.display()))?;

    bar.finish_and_clear();
    println!("Done ({})", id);
    Ok(())
}

async fn cmd_download(client: &DriveClient, file: &str, path: Option<PathBuf>) -> Result<()> {
    client.authenticator().initialize().await?;
    let file_id = extract_id(file)?;

    let metadata = match client.get_file(&file_id).await? {
        Lookup::Found(metadata) => metadata,
        Lookup::NotFound => bail!("File not found: {}", file_id),
    };

    match &path {
        Some(path) if path.as_os_str() != metadata.name.as_str() => {
            println!("Downloading {} to {}", metadata.name, path.display())
        }
        _ => println!("Downloading {}", metadata.name),
    }

    let bar = percent_bar();
    let mut on_progress = |fraction: f64| bar.set_position((fraction * 100.0) as u64);
    let saved = client
        .download_entry(&metadata, path.as_deref(), metadata.size / 10, Some(&mut on_progress))
        .await
        .with_context(|| format!("Failed to download {}", file_id))?;

    bar.finish_and_clear();
    println!("Done. Saved to {}", saved.display());
    Ok(())
}

async fn cmd_delete(client: &DriveClient, file: &str) -> Result<()> {
    client.authenticator().initialize().await?;
    let file_id = extract_id(file)?;

    match client.delete_file(&file_id).await? {
        Lookup::Found(()) => println!("Ok."),
        Lookup::NotFound => bail!("File not found: {}", file_id),
    }
    Ok(())
}

async fn cmd_clear(
    client: &DriveClient,
    folder: Option<&str>,
    keep_first: usize,
    keep_last: usize,
    yes: bool,
) -> Result<()> {
    client.authenticator().initialize().await?;
    let folder_id = folder.map(extract_id).transpose()?;

    let mut prompt_failed = None;
    let mut confirm = |files: &[FileEntry]| {
        let rows: Vec<Vec<String>> = files
            .iter()
            .map(|f| row([f.name.as_str(), format_size(f.size).as_str()]))
            .collect();
        println!("The following {} files will be deleted:", files.len());
        println!("{}", table(&rows, &[1]));

        if yes {
            return Confirm::Proceed;
        }
        let answer = Prompt::new()
            .with_prompt("Do you want to continue?")
            .default(false)
            .interact();
        match answer {
            Ok(true) => Confirm::Proceed,
            Ok(false) => Confirm::Abort,
            Err(e) => {
                prompt_failed = Some(e);
                Confirm::Abort
            }
        }
    };

    let outcome = client
        .clear_folder(folder_id.as_deref(), keep_first, keep_last, Some(&mut confirm))
        .await
        .context("Failed to clear folder")?;

    if let Some(e) = prompt_failed {
        return Err(e).context("Failed to read user input");
    }

    println!("{}", clear_message(outcome)?);
    Ok(())
}

/// What to print once a clear ends. Declining the prompt is an error so the
/// process exits non-zero.
fn clear_message(outcome: ClearOutcome) -> Result<&'static str> {
    match outcome {
        ClearOutcome::Deleted(_) => Ok("Done"),
        ClearOutcome::NothingToDelete => Ok("Nothing to delete"),
        ClearOutcome::Aborted => bail!("Aborted!"),
    }
}

fn percent_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn row<const N: usize>(cells: [&str; N]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// Render rows as space-separated, left-aligned columns. Columns listed in
/// `right_aligned` are padded on the left instead.
fn table(rows: &[Vec<String>], right_aligned: &[usize]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    rows.iter()
        .map(|r| {
            let cells: Vec<String> = r
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    if right_aligned.contains(&i) {
                        format!("{:>width$}", cell, width = widths[i])
                    } else {
                        format!("{:<width$}", cell, width = widths[i])
                    }
                })
                .collect();
            cells.join(" ").trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
