use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use std::path::PathBuf;

pub type DocumentId = u64;
pub type ChunkId = u64;

/// Processing state of a document, persisted alongside its metadata so
/// callers can poll ingestion progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestionStatus {
    #[default]
    Uploaded,
    Extracting,
    Chunking,
    Embedding,
    Ready,
    Failed {
        reason: String,
    },
}

impl IngestionStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed { .. })
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded => f.write_str("uploaded"),
            Self::Extracting => f.write_str("extracting"),
            Self::Chunking => f.write_str("chunking"),
            Self::Embedding => f.write_str("embedding"),
            Self::Ready => f.write_str("ready"),
            Self::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    pub title: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub checksum: String,
    pub owner_id: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub checksum: String,
    pub owner_id: String,
    #[serde(default)]
    pub status: IngestionStatus,
    pub full_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChunk {
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub content: String,
    /// Absent until the embedding step succeeds; such chunks are only
    /// reachable through lexical search.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Text,
    Semantic,
}

impl SearchMode {
    /// Accepts `""`/`"text"` and `"vector"`/`"semantic"`, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "" | "text" => Some(Self::Text),
            "vector" | "semantic" => Some(Self::Semantic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SearchQuery {
    pub text: String,
    pub search_type: String,
    pub limit: Option<i64>,
}

/// A query that passed validation, with its limit resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    pub text: String,
    pub mode: SearchMode,
    pub limit: usize,
}

/// A chunk joined with its document's display metadata and a similarity
/// score in `[0, 1]`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub similarity: f64,
    pub title: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
}

impl SearchResult {
    pub fn from_parts(chunk: &Chunk, document: &Document, similarity: f64) -> Self {
        Self {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            chunk_index: chunk.chunk_index,
            content: chunk.content.clone(),
            created_at: chunk.created_at,
            similarity,
            title: document.title.clone(),
            authors: document.authors.clone(),
            year: document.year,
            category: document.category.clone(),
        }
    }
}
