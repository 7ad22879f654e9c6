use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use doc_archive_core::config::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDER_URL, DEFAULT_MAX_EMBEDDING_CHARS,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
};
use doc_archive_core::{
    discover_pdf_files, ArchiveConfig, CharacterNgramEmbedder, DocumentId, DocumentService,
    EmbedError, Embedder, EmbedderConfig, HttpEmbedder, IngestionOptions, IngestionPipeline,
    IngestionPool, LopdfExtractor, MemoryStore, SearchCoordinator, SearchOptions, SearchQuery,
    ShutdownMode, UploadOptions, UploadRequest, WorkerOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-archive", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Owner every command acts on behalf of
    #[arg(long, env = "ARCHIVE_OWNER", default_value = "default")]
    owner: String,

    /// JSON snapshot holding documents and chunks
    #[arg(long, env = "ARCHIVE_STORE_PATH", default_value = "archive.json")]
    store_path: PathBuf,

    /// Embedding backend
    #[arg(long, env = "ARCHIVE_EMBEDDER", value_enum, default_value_t = EmbedderKind::Http)]
    embedder: EmbedderKind,

    /// Embedding service base URL
    #[arg(long, env = "EMBEDDER_URL", default_value = DEFAULT_EMBEDDER_URL)]
    embedder_url: String,

    /// Embedding request timeout in seconds
    #[arg(long, env = "EMBEDDER_TIMEOUT_SECS", default_value_t = 10)]
    embedder_timeout_secs: u64,

    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Longest text sent to the embedding service per chunk
    #[arg(long, env = "MAX_EMBEDDING_CHARS", default_value_t = DEFAULT_MAX_EMBEDDING_CHARS)]
    max_embedding_chars: usize,

    #[arg(long, env = "SEARCH_DEFAULT_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
    default_limit: usize,

    #[arg(long, env = "SEARCH_MAX_LIMIT", default_value_t = MAX_SEARCH_LIMIT)]
    max_limit: usize,

    /// Concurrent ingestion workers
    #[arg(long, env = "INGEST_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Jobs that may wait for a free worker
    #[arg(long, env = "INGEST_QUEUE_CAPACITY", default_value_t = 64)]
    queue_capacity: usize,

    /// Directory uploaded files are copied into
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// External embedding service
    Http,
    /// Deterministic character n-gram vectors, no network needed
    Local,
}

#[derive(Subcommand)]
enum Command {
    /// Upload one PDF and wait for its ingestion.
    Upload {
        file: PathBuf,
        /// Defaults to the file name without extension.
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        authors: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Upload every PDF below a folder, titled after their file names.
    UploadFolder {
        folder: PathBuf,
        #[arg(long)]
        category: Option<String>,
    },
    /// Search chunks lexically (`text`) or semantically (`semantic`).
    Search {
        query: String,
        #[arg(long = "type", default_value = "text")]
        search_type: String,
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
    },
    /// List documents, newest first.
    List {
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print one document as JSON.
    Show {
        id: DocumentId,
        /// Also print the stored chunks.
        #[arg(long, default_value_t = false)]
        chunks: bool,
    },
    /// Print the ingestion status of a document.
    Status { id: DocumentId },
    /// Delete a document, its chunks and its stored file.
    Delete { id: DocumentId },
    /// Drop a document's chunks and ingest it again.
    Reprocess { id: DocumentId },
}

impl Cli {
    fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig {
            ingestion: IngestionOptions {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
                max_embedding_chars: self.max_embedding_chars,
            },
            search: SearchOptions {
                default_limit: self.default_limit,
                max_limit: self.max_limit,
            },
            embedder: EmbedderConfig {
                base_url: self.embedder_url.clone(),
                timeout: Duration::from_secs(self.embedder_timeout_secs),
            },
            workers: WorkerOptions {
                workers: self.workers,
                queue_capacity: self.queue_capacity,
            },
            upload: UploadOptions {
                upload_dir: self.upload_dir.clone(),
                max_upload_bytes: self.max_upload_bytes,
            },
        }
    }
}

/// Embedding backend picked at startup.
enum ArchiveEmbedder {
    Http(HttpEmbedder),
    Local(CharacterNgramEmbedder),
}

impl ArchiveEmbedder {
    fn build(kind: EmbedderKind, config: &EmbedderConfig) -> Result<Self, EmbedError> {
        Ok(match kind {
            EmbedderKind::Http => Self::Http(HttpEmbedder::new(config)?),
            EmbedderKind::Local => Self::Local(CharacterNgramEmbedder::default()),
        })
    }
}

#[async_trait]
impl Embedder for ArchiveEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        match self {
            Self::Http(embedder) => embedder.embed(text).await,
            Self::Local(embedder) => embedder.embed(text).await,
        }
    }
}

type Service = DocumentService<MemoryStore>;
type Coordinator = SearchCoordinator<MemoryStore, ArchiveEmbedder>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.archive_config();
    config.validate().context("invalid configuration")?;

    let store = Arc::new(
        MemoryStore::load_snapshot(&cli.store_path)
            .await
            .with_context(|| format!("failed to load {}", cli.store_path.display()))?,
    );
    let embedder = Arc::new(
        ArchiveEmbedder::build(cli.embedder, &config.embedder)
            .context("failed to build embedder")?,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        store = %cli.store_path.display(),
        embedder = ?cli.embedder,
        "doc-archive boot"
    );

    let pipeline = IngestionPipeline::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        Arc::new(LopdfExtractor),
        &config.ingestion,
    )?;
    let pool = IngestionPool::start(Arc::new(pipeline), config.workers);
    let interrupt = pool.shutdown_handle();
    let service = DocumentService::new(
        Arc::clone(&store),
        pool.queue(),
        config.upload.clone(),
        config.search,
    );
    let coordinator = SearchCoordinator::new(Arc::clone(&store), embedder, config.search);

    let outcome = tokio::select! {
        outcome = execute(cli.command, &cli.owner, &service, &coordinator) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling ingestion");
            interrupt.trigger(ShutdownMode::Cancel);
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    let stopping = pool.shutdown(ShutdownMode::Drain);
    tokio::pin!(stopping);
    tokio::select! {
        _ = &mut stopping => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling ingestion");
            interrupt.trigger(ShutdownMode::Cancel);
            stopping.await;
        }
    }

    let report = match outcome {
        Ok(submitted) => report_statuses(&service, &cli.owner, &submitted).await,
        Err(error) => Err(error),
    };

    store
        .save_snapshot(&cli.store_path)
        .await
        .with_context(|| format!("failed to save {}", cli.store_path.display()))?;
    report
}

/// Runs one command. Returns the documents queued for ingestion so their
/// final status can be reported once the pool has drained.
async fn execute(
    command: Command,
    owner: &str,
    service: &Service,
    coordinator: &Coordinator,
) -> anyhow::Result<Vec<DocumentId>> {
    match command {
        Command::Upload {
            file,
            title,
            authors,
            year,
            category,
        } => {
            let title = title.unwrap_or_else(|| title_from_path(&file));
            let receipt = service
                .upload(UploadRequest {
                    source: file.clone(),
                    title,
                    authors,
                    year,
                    category,
                    owner_id: owner.to_string(),
                })
                .await
                .with_context(|| format!("failed to upload {}", file.display()))?;
            println!("queued document {} ({})", receipt.id, receipt.status);
            Ok(vec![receipt.id])
        }
        Command::UploadFolder { folder, category } => {
            let files = discover_pdf_files(&folder);
            if files.is_empty() {
                bail!("no PDF files found below {}", folder.display());
            }
            info!(folder = %folder.display(), files = files.len(), "uploading folder");

            let mut submitted = Vec::new();
            let mut skipped = 0usize;
            for file in files {
                let request = UploadRequest {
                    title: title_from_path(&file),
                    source: file.clone(),
                    authors: None,
                    year: None,
                    category: category.clone(),
                    owner_id: owner.to_string(),
                };
                match service.upload(request).await {
                    Ok(receipt) => {
                        println!("queued document {} <- {}", receipt.id, file.display());
                        submitted.push(receipt.id);
                    }
                    Err(error) => {
                        skipped += 1;
                        warn!(path = %file.display(), %error, "skipped pdf");
                    }
                }
            }
            if skipped > 0 {
                warn!(skipped, folder = %folder.display(), "some files were not uploaded");
            }
            Ok(submitted)
        }
        Command::Search {
            query,
            search_type,
            limit,
        } => {
            let results = coordinator
                .search(
                    &SearchQuery {
                        text: query,
                        search_type,
                        limit,
                    },
                    owner,
                )
                .await?;

            if results.is_empty() {
                println!("no matching chunks");
            }
            for hit in results {
                println!(
                    "score={:.4} document={} chunk={} title={:?}",
                    hit.similarity, hit.document_id, hit.chunk_index, hit.title
                );
                println!("  {}", preview(&hit.content, 240));
            }
            Ok(Vec::new())
        }
        Command::List { limit, offset } => {
            let documents = service.list(owner, limit, offset).await?;
            for document in documents {
                println!(
                    "{}\t{}\t{}\t{}",
                    document.id,
                    document.status,
                    document.created_at.to_rfc3339(),
                    document.title
                );
            }
            Ok(Vec::new())
        }
        Command::Show { id, chunks } => {
            let mut document = service.get(id, owner).await?;
            document.full_text = None;
            println!("{}", serde_json::to_string_pretty(&document)?);
            if chunks {
                for chunk in service.chunks(id, owner).await? {
                    println!(
                        "[{}] embedded={} {}",
                        chunk.chunk_index,
                        chunk.embedding.is_some(),
                        preview(&chunk.content, 120)
                    );
                }
            }
            Ok(Vec::new())
        }
        Command::Status { id } => {
            println!("{}", service.status(id, owner).await?);
            Ok(Vec::new())
        }
        Command::Delete { id } => {
            service.delete(id, owner).await?;
            println!("deleted document {id}");
            Ok(Vec::new())
        }
        Command::Reprocess { id } => {
            let receipt = service.reprocess(id, owner).await?;
            println!("queued document {} ({})", receipt.id, receipt.status);
            Ok(vec![receipt.id])
        }
    }
}

async fn report_statuses(
    service: &Service,
    owner: &str,
    submitted: &[DocumentId],
) -> anyhow::Result<()> {
    for id in submitted {
        let status = service.status(*id, owner).await?;
        println!("document {id}: {status}");
    }
    Ok(())
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut shortened: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        shortened.push_str("...");
    }
    shortened
}
