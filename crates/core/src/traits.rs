use crate::error::{EmbeddingError, StoreError};
use crate::models::EmbeddingVector;
use crate::store::QueryResponse;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;
}

/// Handle to one container of the document store.
#[async_trait]
pub trait DocumentContainer {
    fn name(&self) -> &str;

    /// Runs `query_text` and drains every result page before returning.
    async fn query(
        &self,
        query_text: &str,
        cross_partition: bool,
    ) -> Result<QueryResponse, StoreError>;
}
