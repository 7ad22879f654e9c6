use crate::chunking::{normalize_whitespace, truncate_chars, ChunkingConfig};
use crate::config::IngestionOptions;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, IngestError, StoreError};
use crate::extractor::TextExtractor;
use crate::models::{DocumentId, IngestionStatus, NewChunk};
use crate::traits::{ChunkStore, DocumentStore};
use crate::worker::ShutdownSignal;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// One document waiting for (or undergoing) background processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestJob {
    pub document_id: DocumentId,
    pub owner_id: String,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub chunks_total: usize,
    pub chunks_persisted: usize,
    pub embeddings_failed: usize,
    pub persist_failed: usize,
}

/// Extraction, chunking, per-chunk embedding and persistence for a single
/// document. Embedding and persistence failures are confined to the chunk
/// they happen on.
pub struct IngestionPipeline<S, E> {
    store: Arc<S>,
    embedder: Arc<E>,
    extractor: Arc<dyn TextExtractor>,
    chunking: ChunkingConfig,
    max_embedding_chars: usize,
}

impl<S, E> IngestionPipeline<S, E>
where
    S: DocumentStore + ChunkStore + 'static,
    E: Embedder + 'static,
{
    pub fn new(
        store: Arc<S>,
        embedder: Arc<E>,
        extractor: Arc<dyn TextExtractor>,
        options: &IngestionOptions,
    ) -> Result<Self, ConfigError> {
        if options.max_embedding_chars == 0 {
            return Err(ConfigError::InvalidChunking(
                "max_embedding_chars must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            store,
            embedder,
            extractor,
            chunking: ChunkingConfig::try_from(options)?,
            max_embedding_chars: options.max_embedding_chars,
        })
    }

    /// Runs the whole pipeline and records the terminal status: `Ready` on
    /// success, `Failed` with the error text otherwise.
    pub async fn process(
        &self,
        job: &IngestJob,
        shutdown: &ShutdownSignal,
    ) -> Result<IngestReport, IngestError> {
        let span = info_span!("ingest", document_id = job.document_id, owner = %job.owner_id);

        async {
            info!(path = %job.file_path.display(), "starting document processing");
            match self.run(job, shutdown).await {
                Ok(report) => {
                    self.transition(job.document_id, IngestionStatus::Ready).await;
                    info!(
                        chunks = report.chunks_total,
                        persisted = report.chunks_persisted,
                        embeddings_failed = report.embeddings_failed,
                        persist_failed = report.persist_failed,
                        "document chunks processed"
                    );
                    Ok(report)
                }
                Err(error) => {
                    error!(%error, "document processing stopped");
                    self.transition(job.document_id, IngestionStatus::failed(error.to_string()))
                        .await;
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        job: &IngestJob,
        shutdown: &ShutdownSignal,
    ) -> Result<IngestReport, IngestError> {
        let document_id = job.document_id;

        self.transition(document_id, IngestionStatus::Extracting).await;
        let extractor = Arc::clone(&self.extractor);
        let path = job.file_path.clone();
        let raw = tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|error| IngestError::Task(error.to_string()))??;

        let text = normalize_whitespace(&raw);
        if text.is_empty() {
            return Err(IngestError::NoExtractableText(
                job.file_path.display().to_string(),
            ));
        }
        if let Err(error) = self.store.set_full_text(document_id, &text).await {
            warn!(%error, "failed to store extracted text");
        }
        info!(text_length = text.chars().count(), "document text extracted");

        if shutdown.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        self.transition(document_id, IngestionStatus::Chunking).await;
        let chunks = self.chunking.chunk(&text);
        info!(chunks = chunks.len(), "text chunked");

        self.transition(document_id, IngestionStatus::Embedding).await;
        let mut report = IngestReport {
            document_id,
            chunks_total: chunks.len(),
            ..IngestReport::default()
        };

        for (index, content) in chunks.into_iter().enumerate() {
            let chunk_index = u32::try_from(index).map_err(|_| {
                IngestError::InvalidArgument(format!("chunk index {index} exceeds u32"))
            })?;

            let input = truncate_chars(&content, self.max_embedding_chars);
            let embedded = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(IngestError::Cancelled),
                embedded = self.embedder.embed(input) => embedded,
            };
            let embedding = match embedded {
                Ok(vector) => Some(vector),
                Err(error) => {
                    report.embeddings_failed += 1;
                    warn!(chunk_index, %error, "failed to get embedding for chunk");
                    None
                }
            };

            let unembedded = embedding.is_some().then(|| NewChunk {
                document_id,
                chunk_index,
                content: content.clone(),
                embedding: None,
            });
            let saved = match self
                .store
                .insert_chunk(NewChunk {
                    document_id,
                    chunk_index,
                    content,
                    embedding,
                })
                .await
            {
                // Keep the chunk reachable lexically when its vector does not fit the index.
                Err(StoreError::DimensionMismatch { expected, actual }) => {
                    report.embeddings_failed += 1;
                    warn!(
                        chunk_index,
                        expected,
                        actual,
                        "embedding dimension mismatch, storing chunk without vector"
                    );
                    match unembedded {
                        Some(chunk) => self.store.insert_chunk(chunk).await,
                        None => Err(StoreError::DimensionMismatch { expected, actual }),
                    }
                }
                other => other,
            };

            match saved {
                Ok(_) => report.chunks_persisted += 1,
                // The document itself is gone, nothing left to attach chunks to.
                Err(error @ StoreError::NotFound { .. }) => return Err(error.into()),
                Err(error) => {
                    report.persist_failed += 1;
                    error!(chunk_index, %error, "failed to save chunk");
                }
            }
        }

        Ok(report)
    }

    async fn transition(&self, document_id: DocumentId, status: IngestionStatus) {
        if let Err(error) = self.store.set_status(document_id, status.clone()).await {
            warn!(%error, %status, "failed to record ingestion status");
        }
    }
}
