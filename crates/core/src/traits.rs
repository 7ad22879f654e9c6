use crate::models::{
    Chunk, ChunkId, Document, DocumentId, IngestionStatus, NewChunk, NewDocument, SearchResult,
};
use crate::StoreError;
use async_trait::async_trait;

/// Owner-scoped document metadata. Lookups for documents owned by someone
/// else behave exactly like lookups for missing documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, document: NewDocument) -> Result<DocumentId, StoreError>;

    async fn get_document(&self, id: DocumentId, owner_id: &str) -> Result<Document, StoreError>;

    async fn list_documents(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>, StoreError>;

    async fn delete_document(&self, id: DocumentId, owner_id: &str) -> Result<(), StoreError>;

    async fn set_status(&self, id: DocumentId, status: IngestionStatus) -> Result<(), StoreError>;

    async fn set_full_text(&self, id: DocumentId, text: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn insert_chunk(&self, chunk: NewChunk) -> Result<ChunkId, StoreError>;

    /// Chunks of one document ordered by `chunk_index`.
    async fn list_chunks(&self, document_id: DocumentId) -> Result<Vec<Chunk>, StoreError>;

    async fn delete_chunks(&self, document_id: DocumentId) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait KeywordIndex: Send + Sync {
    async fn search_keyword(
        &self,
        query: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search_vector(
        &self,
        query_vector: &[f32],
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError>;
}
