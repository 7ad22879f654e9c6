use thiserror::Error;

/// Coarse classification shared by every error type, used by boundary layers
/// to pick a response without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    EmbeddingFailure,
    NotFound,
    StorageFailure,
    ExtractionFailure,
    Internal,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid chunking config: {0}")]
    InvalidChunking(String),

    #[error("invalid search limits: {0}")]
    InvalidSearchLimits(String),

    #[error("invalid worker options: {0}")]
    InvalidWorkers(String),

    #[error("invalid embedder url: {0}")]
    InvalidEmbedderUrl(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("embedding service returned no embedding")]
    EmptyResult,

    #[error("invalid response from embedding service: {0}")]
    InvalidResponse(String),

    #[error("invalid embedding endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

impl From<reqwest::Error> for EmbedError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::ServiceUnavailable(error.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("embedding dimension {actual} does not match stored dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn document_not_found(id: u64) -> Self {
        Self::NotFound {
            entity: "document",
            id,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::StorageFailure,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable pdf: {0}")]
    Unreadable(String),

    #[error("no extractable text in {0}")]
    NoExtractableText(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("ingestion queue is closed")]
    QueueClosed,

    #[error("ingestion task failed: {0}")]
    Task(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreadable(_) | Self::NoExtractableText(_) => ErrorKind::ExtractionFailure,
            Self::MissingFileName(_) | Self::InvalidUpload(_) | Self::InvalidArgument(_) => {
                ErrorKind::Validation
            }
            Self::Store(error) => error.kind(),
            Self::Embedding(_) => ErrorKind::EmbeddingFailure,
            Self::Io(_) | Self::Cancelled | Self::QueueClosed | Self::Task(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("invalid search type {0:?}, use 'text' or 'semantic'")]
    InvalidType(String),

    #[error("failed to get embedding: {0}")]
    Embedding(#[source] EmbedError),

    #[error("search failed: {0}")]
    Storage(#[from] StoreError),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery | Self::InvalidType(_) => ErrorKind::Validation,
            Self::Embedding(_) => ErrorKind::EmbeddingFailure,
            Self::Storage(error) => error.kind(),
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
