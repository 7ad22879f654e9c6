use crate::config::SearchOptions;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{SearchMode, SearchQuery, SearchResult, ValidatedQuery};
use crate::traits::{KeywordIndex, VectorIndex};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes a query to lexical or semantic ranking, scoped to one owner.
pub struct SearchCoordinator<S, E> {
    store: Arc<S>,
    embedder: Arc<E>,
    options: SearchOptions,
}

impl<S, E> SearchCoordinator<S, E>
where
    S: KeywordIndex + VectorIndex,
    E: Embedder,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, options: SearchOptions) -> Self {
        Self {
            store,
            embedder,
            options,
        }
    }

    pub fn validate(&self, query: &SearchQuery) -> Result<ValidatedQuery, SearchError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let mode = SearchMode::parse(&query.search_type)
            .ok_or_else(|| SearchError::InvalidType(query.search_type.clone()))?;

        Ok(ValidatedQuery {
            text: text.to_string(),
            mode,
            limit: self.options.effective_limit(query.limit),
        })
    }

    pub async fn search(
        &self,
        query: &SearchQuery,
        owner_id: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let query = self.validate(query)?;
        debug!(mode = ?query.mode, limit = query.limit, owner = owner_id, "searching chunks");

        let mut hits = match query.mode {
            SearchMode::Text => {
                self.store
                    .search_keyword(&query.text, owner_id, query.limit)
                    .await?
            }
            SearchMode::Semantic => {
                let vector = self.embedder.embed(&query.text).await.map_err(|error| {
                    warn!(%error, "failed to get embedding for query");
                    SearchError::Embedding(error)
                })?;
                self.store
                    .search_vector(&vector, owner_id, query.limit)
                    .await?
            }
        };

        hits.truncate(query.limit);
        for hit in &mut hits {
            hit.similarity = normalize_score(hit.similarity);
        }
        Ok(hits)
    }
}

/// Clamps a backend score into `[0, 1]`; NaN counts as no similarity.
pub fn normalize_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
