use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CHUNK_SIZE: usize = 4_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_MAX_EMBEDDING_CHARS: usize = 8_000;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const DEFAULT_EMBEDDER_URL: &str = "http://localhost:5001";
pub const DEFAULT_EMBEDDER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 << 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionOptions {
    /// Window length in code points.
    pub chunk_size: usize,
    /// Code points shared by consecutive windows; must stay below `chunk_size`.
    pub chunk_overlap: usize,
    /// Upper bound on the text sent to the embedding service per call.
    pub max_embedding_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_embedding_chars: DEFAULT_MAX_EMBEDDING_CHARS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchOptions {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
            max_limit: MAX_SEARCH_LIMIT,
        }
    }
}

impl SearchOptions {
    /// Absent or non-positive limits fall back to the default; anything above
    /// the maximum is clamped.
    pub fn effective_limit(&self, requested: Option<i64>) -> usize {
        let limit = match requested {
            Some(value) if value > 0 => usize::try_from(value).unwrap_or(usize::MAX),
            _ => self.default_limit,
        };
        limit.min(self.max_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBEDDER_URL.to_string(),
            timeout: DEFAULT_EMBEDDER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub ingestion: IngestionOptions,
    pub search: SearchOptions,
    pub embedder: EmbedderConfig,
    pub workers: WorkerOptions,
    pub upload: UploadOptions,
}

impl ArchiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ingestion = &self.ingestion;
        if ingestion.chunk_size == 0 {
            return Err(ConfigError::InvalidChunking(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if ingestion.chunk_overlap >= ingestion.chunk_size {
            return Err(ConfigError::InvalidChunking(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                ingestion.chunk_overlap, ingestion.chunk_size
            )));
        }
        if ingestion.max_embedding_chars == 0 {
            return Err(ConfigError::InvalidChunking(
                "max_embedding_chars must be at least 1".to_string(),
            ));
        }

        if self.search.default_limit == 0 {
            return Err(ConfigError::InvalidSearchLimits(
                "default_limit must be at least 1".to_string(),
            ));
        }
        if self.search.default_limit > self.search.max_limit {
            return Err(ConfigError::InvalidSearchLimits(format!(
                "default_limit {} exceeds max_limit {}",
                self.search.default_limit, self.search.max_limit
            )));
        }

        if self.workers.workers == 0 || self.workers.queue_capacity == 0 {
            return Err(ConfigError::InvalidWorkers(format!(
                "workers ({}) and queue_capacity ({}) must be at least 1",
                self.workers.workers, self.workers.queue_capacity
            )));
        }

        Url::parse(&self.embedder.base_url)?;
        Ok(())
    }
}
