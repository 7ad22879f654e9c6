//! Reference storage backend kept entirely in memory.
//!
//! Lexical ranking follows `pg_trgm` similarity and vector ranking uses cosine
//! similarity, so results line up with what a Postgres deployment with the
//! trigram and pgvector extensions returns. State can be snapshotted to a JSON
//! file and loaded back.

use crate::models::{
    Chunk, ChunkId, Document, DocumentId, IngestionStatus, NewChunk, NewDocument, SearchResult,
};
use crate::traits::{ChunkStore, DocumentStore, KeywordIndex, VectorIndex};
use crate::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_document_id: DocumentId,
    next_chunk_id: ChunkId,
    documents: BTreeMap<DocumentId, Document>,
    chunks: BTreeMap<ChunkId, Chunk>,
}

impl StoreState {
    fn owned_document(&self, id: DocumentId, owner_id: &str) -> Result<&Document, StoreError> {
        self.documents
            .get(&id)
            .filter(|document| document.owner_id == owner_id)
            .ok_or_else(|| StoreError::document_not_found(id))
    }

    /// Dimension shared by the embedded chunks currently stored, if any.
    fn stored_dimensions(&self) -> Option<usize> {
        self.chunks
            .values()
            .find_map(|chunk| chunk.embedding.as_ref().map(Vec::len))
    }

    fn document_mut(&mut self, id: DocumentId) -> Result<&mut Document, StoreError> {
        self.documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::document_not_found(id))
    }

    /// Chunks whose document belongs to `owner_id`, paired with that document.
    fn owned_chunks<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> impl Iterator<Item = (&'a Chunk, &'a Document)> + 'a {
        self.chunks.values().filter_map(move |chunk| {
            self.documents
                .get(&chunk.document_id)
                .filter(|document| document.owner_id == owner_id)
                .map(|document| (chunk, document))
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot written by [`MemoryStore::save_snapshot`]; a missing
    /// file yields an empty store.
    pub async fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = {
            let state = self.state.read().await;
            serde_json::to_vec_pretty(&*state)?
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, document: NewDocument) -> Result<DocumentId, StoreError> {
        let mut state = self.state.write().await;
        state.next_document_id += 1;
        let id = state.next_document_id;

        state.documents.insert(
            id,
            Document {
                id,
                title: document.title,
                authors: document.authors,
                year: document.year,
                category: document.category,
                file_path: document.file_path,
                file_size: document.file_size,
                checksum: document.checksum,
                owner_id: document.owner_id,
                status: IngestionStatus::Uploaded,
                full_text: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_document(&self, id: DocumentId, owner_id: &str) -> Result<Document, StoreError> {
        let state = self.state.read().await;
        state.owned_document(id, owner_id).cloned()
    }

    async fn list_documents(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|document| document.owner_id == owner_id)
            .cloned()
            .collect();

        documents.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });
        Ok(documents.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_document(&self, id: DocumentId, owner_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.owned_document(id, owner_id)?;
        state.documents.remove(&id);
        state.chunks.retain(|_, chunk| chunk.document_id != id);
        Ok(())
    }

    async fn set_status(&self, id: DocumentId, status: IngestionStatus) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.document_mut(id)?.status = status;
        Ok(())
    }

    async fn set_full_text(&self, id: DocumentId, text: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.document_mut(id)?.full_text = Some(text.to_string());
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn insert_chunk(&self, chunk: NewChunk) -> Result<ChunkId, StoreError> {
        let mut state = self.state.write().await;
        if !state.documents.contains_key(&chunk.document_id) {
            return Err(StoreError::document_not_found(chunk.document_id));
        }

        let duplicate = state.chunks.values().any(|existing| {
            existing.document_id == chunk.document_id && existing.chunk_index == chunk.chunk_index
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "document {} already has chunk {}",
                chunk.document_id, chunk.chunk_index
            )));
        }

        if let Some(vector) = &chunk.embedding {
            if let Some(expected) = state.stored_dimensions() {
                if expected != vector.len() {
                    return Err(StoreError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
        }

        state.next_chunk_id += 1;
        let id = state.next_chunk_id;
        state.chunks.insert(
            id,
            Chunk {
                id,
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                content: chunk.content,
                embedding: chunk.embedding,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn list_chunks(&self, document_id: DocumentId) -> Result<Vec<Chunk>, StoreError> {
        let state = self.state.read().await;
        let mut chunks: Vec<Chunk> = state
            .chunks
            .values()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        Ok(chunks)
    }

    async fn delete_chunks(&self, document_id: DocumentId) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let before = state.chunks.len();
        state.chunks.retain(|_, chunk| chunk.document_id != document_id);
        Ok(before - state.chunks.len())
    }
}

#[async_trait]
impl KeywordIndex for MemoryStore {
    async fn search_keyword(
        &self,
        query: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let query_trigrams = trigrams(query);
        let state = self.state.read().await;

        let mut results: Vec<SearchResult> = state
            .owned_chunks(owner_id)
            .filter_map(|(chunk, document)| {
                let score = jaccard(&query_trigrams, &trigrams(&chunk.content));
                (score > 0.0).then(|| SearchResult::from_parts(chunk, document, score))
            })
            .collect();

        rank(&mut results, limit);
        Ok(results)
    }
}

#[async_trait]
impl VectorIndex for MemoryStore {
    async fn search_vector(
        &self,
        query_vector: &[f32],
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let state = self.state.read().await;

        let mut results: Vec<SearchResult> = state
            .owned_chunks(owner_id)
            .filter_map(|(chunk, document)| {
                let vector = chunk.embedding.as_ref()?;
                if vector.len() != query_vector.len() {
                    return None;
                }
                let score = f64::from(cosine_similarity(vector, query_vector));
                Some(SearchResult::from_parts(chunk, document, score))
            })
            .collect();

        rank(&mut results, limit);
        Ok(results)
    }
}

fn rank(results: &mut Vec<SearchResult>, limit: usize) {
    results.sort_by(|left, right| {
        right
            .similarity
            .total_cmp(&left.similarity)
            .then_with(|| left.chunk_id.cmp(&right.chunk_id))
    });
    results.truncate(limit);
}

/// Trigram set of `text` the way `pg_trgm` builds it: lower-cased
/// alphanumeric words padded with two leading blanks and one trailing blank.
pub(crate) fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut set = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            set.insert([window[0], window[1], window[2]]);
        }
    }
    set
}

fn jaccard(left: &HashSet<[char; 3]>, right: &HashSet<[char; 3]>) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn new_document(owner: &str, title: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            authors: None,
            year: Some(2021),
            category: None,
            file_path: PathBuf::from(format!("/tmp/{title}.pdf")),
            file_size: 42,
            checksum: "abc".to_string(),
            owner_id: owner.to_string(),
        }
    }

    fn new_chunk(
        document_id: DocumentId,
        index: u32,
        content: &str,
        embedding: Option<Vec<f32>>,
    ) -> NewChunk {
        NewChunk {
            document_id,
            chunk_index: index,
            content: content.to_string(),
            embedding,
        }
    }

    #[test]
    fn trigram_similarity_matches_pg_trgm_for_identical_words() {
        let word = trigrams("Word");
        assert_eq!(word.len(), 5);
        assert!((jaccard(&word, &trigrams("word")) - 1.0).abs() < f64::EPSILON);
        assert_eq!(jaccard(&word, &trigrams("zzz")), 0.0);
    }

    #[tokio::test]
    async fn foreign_documents_are_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        let id = store.create_document(new_document("alice", "manual")).await?;

        assert_eq!(store.get_document(id, "alice").await?.title, "manual");
        assert!(matches!(
            store.get_document(id, "bob").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete_document(id, "bob").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.list_documents("bob", 10, 0).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn keyword_search_ranks_within_owner() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        let alice_doc = store.create_document(new_document("alice", "pumps")).await?;
        let bob_doc = store.create_document(new_document("bob", "pumps")).await?;

        store
            .insert_chunk(new_chunk(alice_doc, 0, "hydraulic pump maintenance schedule", None))
            .await?;
        store
            .insert_chunk(new_chunk(alice_doc, 1, "electrical wiring of the control cabinet", None))
            .await?;
        store
            .insert_chunk(new_chunk(bob_doc, 0, "hydraulic pump maintenance", None))
            .await?;

        let hits = store.search_keyword("hydraulic pump", "alice", 10).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, alice_doc);
        assert_eq!(hits[0].chunk_index, 0);
        assert!(hits[0].similarity > 0.0 && hits[0].similarity <= 1.0);
        Ok(())
    }

    #[tokio::test]
    async fn vector_search_skips_unembedded_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        let id = store.create_document(new_document("alice", "vectors")).await?;
        store
            .insert_chunk(new_chunk(id, 0, "close", Some(vec![1.0, 0.0])))
            .await?;
        store
            .insert_chunk(new_chunk(id, 1, "far", Some(vec![0.0, 1.0])))
            .await?;
        store.insert_chunk(new_chunk(id, 2, "no vector", None)).await?;

        let hits = store.search_vector(&[1.0, 0.1], "alice", 10).await?;
        let contents: Vec<&str> = hits.iter().map(|hit| hit.content.as_str()).collect();
        assert_eq!(contents, vec!["close", "far"]);

        let limited = store.search_vector(&[1.0, 0.1], "alice", 1).await?;
        assert_eq!(limited.len(), 1);
        assert!(store.search_vector(&[1.0, 0.1], "bob", 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn chunk_invariants_are_enforced() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        let id = store.create_document(new_document("alice", "doc")).await?;

        assert!(matches!(
            store.insert_chunk(new_chunk(id + 100, 0, "orphan", None)).await,
            Err(StoreError::NotFound { .. })
        ));

        store.insert_chunk(new_chunk(id, 0, "first", Some(vec![0.5; 3]))).await?;
        assert!(matches!(
            store.insert_chunk(new_chunk(id, 0, "again", None)).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.insert_chunk(new_chunk(id, 1, "short", Some(vec![0.5; 2]))).await,
            Err(StoreError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn dimension_follows_the_embedded_chunks_still_stored(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        let first = store.create_document(new_document("alice", "first")).await?;
        store
            .insert_chunk(new_chunk(first, 0, "wide", Some(vec![0.25; 16])))
            .await?;
        store.insert_chunk(new_chunk(first, 1, "plain", None)).await?;

        let second = store.create_document(new_document("alice", "second")).await?;
        assert!(matches!(
            store
                .insert_chunk(new_chunk(second, 0, "narrow", Some(vec![0.5; 8])))
                .await,
            Err(StoreError::DimensionMismatch { expected: 16, actual: 8 })
        ));

        store.delete_document(first, "alice").await?;
        store
            .insert_chunk(new_chunk(second, 0, "narrow", Some(vec![0.5; 8])))
            .await?;
        assert_eq!(store.search_vector(&[0.5; 8], "alice", 10).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_a_document_cascades_to_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        let id = store.create_document(new_document("alice", "doc")).await?;
        store.insert_chunk(new_chunk(id, 0, "content", None)).await?;

        store.delete_document(id, "alice").await?;
        assert!(store.list_chunks(id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("archive.json");

        let store = MemoryStore::new();
        let id = store.create_document(new_document("alice", "doc")).await?;
        store.set_status(id, IngestionStatus::Ready).await?;
        store.insert_chunk(new_chunk(id, 0, "content", Some(vec![1.0]))).await?;
        store.save_snapshot(&path).await?;

        let restored = MemoryStore::load_snapshot(&path).await?;
        assert_eq!(restored.get_document(id, "alice").await?.status, IngestionStatus::Ready);
        assert_eq!(restored.list_chunks(id).await?.len(), 1);

        let next = restored.create_document(new_document("alice", "next")).await?;
        assert!(next > id);

        let empty = MemoryStore::load_snapshot(&dir.path().join("missing.json")).await?;
        assert!(empty.list_documents("alice", 10, 0).await?.is_empty());
        Ok(())
    }
}
