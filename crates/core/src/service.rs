use crate::config::{SearchOptions, UploadOptions};
use crate::error::IngestError;
use crate::ingest::{digest_bytes, IngestJob};
use crate::models::{Chunk, Document, DocumentId, IngestionStatus, NewDocument};
use crate::traits::{ChunkStore, DocumentStore};
use crate::worker::IngestQueue;
use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub source: PathBuf,
    pub title: String,
    pub authors: Option<String>,
    /// Free-form year; kept only when it parses to a plausible publication year.
    pub year: Option<String>,
    pub category: Option<String>,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub id: DocumentId,
    pub status: IngestionStatus,
}

/// Document lifecycle for one archive: upload, lookup, removal and
/// re-ingestion. Every operation is scoped to the calling owner.
pub struct DocumentService<S> {
    store: Arc<S>,
    queue: IngestQueue,
    upload: UploadOptions,
    search: SearchOptions,
}

impl<S> DocumentService<S>
where
    S: DocumentStore + ChunkStore,
{
    pub fn new(
        store: Arc<S>,
        queue: IngestQueue,
        upload: UploadOptions,
        search: SearchOptions,
    ) -> Self {
        Self {
            store,
            queue,
            upload,
            search,
        }
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, IngestError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(IngestError::InvalidUpload("title is required".to_string()));
        }

        let file_name = request
            .source
            .file_name()
            .ok_or_else(|| IngestError::MissingFileName(request.source.display().to_string()))?;
        if !has_pdf_extension(Path::new(file_name)) {
            return Err(IngestError::InvalidUpload(format!(
                "only PDF files are allowed: {}",
                request.source.display()
            )));
        }

        let size = tokio::fs::metadata(&request.source).await?.len();
        if size > self.upload.max_upload_bytes {
            return Err(IngestError::InvalidUpload(format!(
                "file is {size} bytes, the limit is {}",
                self.upload.max_upload_bytes
            )));
        }

        let bytes = tokio::fs::read(&request.source).await?;
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(IngestError::InvalidUpload(format!(
                "{} is not a PDF document",
                request.source.display()
            )));
        }

        tokio::fs::create_dir_all(&self.upload.upload_dir).await?;
        let stored_path = self
            .upload
            .upload_dir
            .join(format!("{}.pdf", Uuid::new_v4()));
        tokio::fs::write(&stored_path, &bytes).await?;

        let new_document = NewDocument {
            title: title.to_string(),
            authors: non_empty(request.authors),
            year: parse_year(request.year.as_deref(), Utc::now().year()),
            category: non_empty(request.category),
            file_path: stored_path.clone(),
            file_size: bytes.len() as u64,
            checksum: digest_bytes(&bytes),
            owner_id: request.owner_id.clone(),
        };

        let id = match self.store.create_document(new_document).await {
            Ok(id) => id,
            Err(error) => {
                remove_stored_file(&stored_path).await;
                return Err(error.into());
            }
        };
        info!(document_id = id, owner = %request.owner_id, size, "document uploaded");

        self.enqueue(id, &request.owner_id, stored_path).await?;

        Ok(UploadReceipt {
            id,
            status: IngestionStatus::Uploaded,
        })
    }

    pub async fn get(&self, id: DocumentId, owner_id: &str) -> Result<Document, IngestError> {
        Ok(self.store.get_document(id, owner_id).await?)
    }

    pub async fn list(
        &self,
        owner_id: &str,
        limit: Option<i64>,
        offset: usize,
    ) -> Result<Vec<Document>, IngestError> {
        let limit = self.search.effective_limit(limit);
        Ok(self.store.list_documents(owner_id, limit, offset).await?)
    }

    pub async fn status(
        &self,
        id: DocumentId,
        owner_id: &str,
    ) -> Result<IngestionStatus, IngestError> {
        Ok(self.store.get_document(id, owner_id).await?.status)
    }

    pub async fn chunks(&self, id: DocumentId, owner_id: &str) -> Result<Vec<Chunk>, IngestError> {
        self.store.get_document(id, owner_id).await?;
        Ok(self.store.list_chunks(id).await?)
    }

    pub async fn delete(&self, id: DocumentId, owner_id: &str) -> Result<(), IngestError> {
        let document = self.store.get_document(id, owner_id).await?;
        self.store.delete_document(id, owner_id).await?;
        remove_stored_file(&document.file_path).await;
        info!(document_id = id, owner = owner_id, "document deleted");
        Ok(())
    }

    /// Drops the document's chunks and queues it for a fresh ingestion run.
    pub async fn reprocess(
        &self,
        id: DocumentId,
        owner_id: &str,
    ) -> Result<UploadReceipt, IngestError> {
        let document = self.store.get_document(id, owner_id).await?;
        if !(document.status.is_terminal() || document.status == IngestionStatus::Uploaded) {
            return Err(IngestError::InvalidArgument(format!(
                "document {id} is still being processed ({})",
                document.status
            )));
        }
        let removed = self.store.delete_chunks(id).await?;
        self.store.set_status(id, IngestionStatus::Uploaded).await?;
        info!(document_id = id, removed_chunks = removed, "document queued for reprocessing");

        self.enqueue(id, owner_id, document.file_path).await?;
        Ok(UploadReceipt {
            id,
            status: IngestionStatus::Uploaded,
        })
    }

    async fn enqueue(
        &self,
        document_id: DocumentId,
        owner_id: &str,
        file_path: PathBuf,
    ) -> Result<(), IngestError> {
        let job = IngestJob {
            document_id,
            owner_id: owner_id.to_string(),
            file_path,
        };
        if let Err(error) = self.queue.submit(job).await {
            let status = IngestionStatus::failed(error.to_string());
            if let Err(status_error) = self.store.set_status(document_id, status).await {
                warn!(document_id, %status_error, "failed to record queue rejection");
            }
            return Err(error);
        }
        Ok(())
    }
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Accepts `0 < year <= current_year + 1`; anything else is dropped.
pub fn parse_year(raw: Option<&str>, current_year: i32) -> Option<i32> {
    let year = raw?.trim().parse::<i32>().ok()?;
    (year > 0 && year <= current_year + 1).then_some(year)
}

async fn remove_stored_file(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), %error, "failed to remove stored file");
    }
}
