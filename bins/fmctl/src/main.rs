//! Operator CLI for the file manager.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use fm_core::connector::MemoryConnector;
use fm_core::fm::{FmService, UploadInitRequest};
use fm_core::links::extract_fm_file_uids;
use fm_core::policy::PolicyTable;
use fm_core::sniff::{DIMENSION_PROBE_LEN, image_dimensions, sniff_mime_from_header};
use fm_core::storage;
use fm_core::storage_key;
use fm_shared::AppConfig;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fmctl")]
#[command(about = "Operator CLI for the file manager")]
#[command(version)]
struct Cli {
    /// Extra config file layered over config/default and config/{RUN_MODE}
    #[arg(long, global = true, env = "FM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect a file's MIME type and, for images, its dimensions
    Sniff {
        /// File to inspect
        path: PathBuf,
    },
    /// Check an upload against the purpose allowlist
    Check {
        /// Upload purpose (avatar, resume, document, image, video, attachment, cms_media)
        #[arg(long)]
        purpose: String,
        /// Client filename
        #[arg(long)]
        filename: String,
        /// Declared content type
        #[arg(long)]
        content_type: String,
        /// Declared size in bytes
        #[arg(long, allow_negative_numbers = true)]
        size: i64,
    },
    /// Print the file uids a content document references
    Links {
        /// HTML or Markdown document
        path: PathBuf,
    },
    /// Upload a file through the service into the configured storage
    Import {
        /// File to upload
        path: PathBuf,
        /// Upload purpose
        #[arg(long)]
        purpose: String,
        /// Title stored with the file
        #[arg(long)]
        title: Option<String>,
        /// Content type; sniffed from the file when omitted
        #[arg(long)]
        content_type: Option<String>,
        /// Mark the file public
        #[arg(long, default_value_t = false)]
        public: bool,
    },
    /// Show object metadata for a storage key
    Head {
        /// `{bucket}/{object_key}`
        storage_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Sniff { path } => sniff(&path).await,
        Commands::Check {
            purpose,
            filename,
            content_type,
            size,
        } => check(&purpose, &filename, &content_type, size),
        Commands::Links { path } => links(&path).await,
        Commands::Import {
            path,
            purpose,
            title,
            content_type,
            public,
        } => {
            let request = ImportRequest {
                purpose,
                title,
                content_type,
                public,
            };
            import(&config, &path, request).await
        }
        Commands::Head { storage_key } => head(&config, &storage_key).await,
    }
}

async fn read_prefix(path: &Path, len: u64) -> Result<Vec<u8>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut prefix = Vec::new();
    file.take(len).read_to_end(&mut prefix).await?;
    Ok(prefix)
}

async fn sniff(path: &Path) -> Result<()> {
    let prefix = read_prefix(path, DIMENSION_PROBE_LEN).await?;
    let Some(mime) = sniff_mime_from_header(&prefix) else {
        println!("mime: unknown");
        return Ok(());
    };
    println!("mime: {mime}");
    if let Some(dimensions) = image_dimensions(mime, &prefix) {
        println!("dimensions: {}x{}", dimensions.width, dimensions.height);
    }
    Ok(())
}

fn check(purpose: &str, filename: &str, content_type: &str, size: i64) -> Result<()> {
    let validated = PolicyTable::builtin().validate(purpose, filename, content_type, size)?;
    println!("purpose: {}", validated.effective_purpose);
    println!("extension: {}", validated.ext);
    println!("mime: {}", validated.normalized_mime_type);
    println!("size: {}", validated.size_bytes);
    Ok(())
}

async fn links(path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    for uid in extract_fm_file_uids(&content) {
        println!("{uid}");
    }
    Ok(())
}

struct ImportRequest {
    purpose: String,
    title: Option<String>,
    content_type: Option<String>,
    public: bool,
}

async fn import(config: &AppConfig, path: &Path, request: ImportRequest) -> Result<()> {
    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let content_type = match request.content_type {
        Some(content_type) => content_type,
        None => sniff_mime_from_header(&body)
            .unwrap_or("application/octet-stream")
            .to_string(),
    };
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("path has no UTF-8 file name")?
        .to_string();
    let size_bytes = i64::try_from(body.len()).context("file too large")?;

    let storage = storage::from_provider(&config.storage)?;
    let service = FmService::new(config.fm.clone(), Arc::new(MemoryConnector::new()), storage);

    let init = service
        .upload_init(
            UploadInitRequest {
                purpose: request.purpose,
                filename,
                content_type: content_type.clone(),
                size_bytes,
                is_public: request.public,
                destination_hint: None,
                title: request.title,
                alt_text: None,
                tags: Vec::new(),
            },
            None,
            None,
        )
        .await?;
    info!(file_uid = %init.file.uid, key = %init.object, "Writing object");

    let file = service
        .upload_write_and_finalize(&init.file.uid, Bytes::from(body), Some(&content_type))
        .await?;
    println!("{}", serde_json::to_string_pretty(&file)?);
    Ok(())
}

async fn head(config: &AppConfig, storage_key: &str) -> Result<()> {
    let target = storage_key::decode(storage_key)?;
    let storage = storage::from_provider(&config.storage)?;
    let head = storage.head_object(&target).await?;
    if !head.exists {
        bail!("object {target} not found");
    }
    println!("{}", serde_json::to_string_pretty(&head)?);
    Ok(())
}
