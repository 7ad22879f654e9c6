pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod service;
pub mod stores;
pub mod traits;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use chunking::{chunk_text, normalize_whitespace, truncate_chars, ChunkingConfig};
pub use config::{
    ArchiveConfig, EmbedderConfig, IngestionOptions, SearchOptions, UploadOptions, WorkerOptions,
};
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ConfigError, EmbedError, ErrorKind, IngestError, SearchError, StoreError};
pub use extractor::{LopdfExtractor, PageText, TextExtractor};
pub use ingest::{discover_pdf_files, IngestJob, IngestReport, IngestionPipeline};
pub use models::{
    Chunk, ChunkId, Document, DocumentId, IngestionStatus, NewChunk, NewDocument, SearchMode,
    SearchQuery, SearchResult, ValidatedQuery,
};
pub use orchestrator::SearchCoordinator;
pub use service::{DocumentService, UploadReceipt, UploadRequest};
pub use stores::MemoryStore;
pub use traits::{ChunkStore, DocumentStore, KeywordIndex, VectorIndex};
pub use worker::{IngestQueue, IngestionPool, ShutdownHandle, ShutdownMode, ShutdownSignal};
