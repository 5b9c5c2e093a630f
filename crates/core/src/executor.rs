use crate::error::{EmbeddingError, SearchError, StoreError};
use crate::models::{ExecutionResult, PaperRow, SearchRequest};
use crate::query::{build_query, QueryShape};
use crate::store::ContainerSet;
use crate::traits::{DocumentContainer, EmbeddingProvider};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Turns a [`SearchRequest`] into one executed query and its telemetry.
pub struct SearchExecutor<E, C>
where
    E: EmbeddingProvider,
    C: DocumentContainer,
{
    embedder: E,
    containers: ContainerSet<C>,
}

impl<E, C> SearchExecutor<E, C>
where
    E: EmbeddingProvider + Send + Sync,
    C: DocumentContainer + Send + Sync,
{
    pub fn new(embedder: E, containers: ContainerSet<C>) -> Self {
        Self {
            embedder,
            containers,
        }
    }

    pub fn containers(&self) -> &ContainerSet<C> {
        &self.containers
    }

    pub fn into_parts(self) -> (E, ContainerSet<C>) {
        (self.embedder, self.containers)
    }

    pub async fn execute(&self, request: &SearchRequest) -> Result<ExecutionResult, SearchError> {
        if request.text.trim().is_empty() {
            return Err(SearchError::Input("query is empty".to_string()));
        }

        let mut embedding = None;
        let mut embedding_time = None;
        if request.mode.needs_embedding() {
            debug!(mode = %request.mode, phase = "embedding_pending", "generating query embedding");
            let started = Instant::now();
            let vector = self.embedder.embed(&request.text).await?;
            let elapsed = started.elapsed();
            if vector.dimensions() != self.embedder.dimensions() {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.embedder.dimensions(),
                    actual: vector.dimensions(),
                }
                .into());
            }
            debug!(
                dimensions = vector.dimensions(),
                elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
                "query embedding ready"
            );
            embedding = Some(vector);
            embedding_time = Some(elapsed);
        }

        let shape = QueryShape::for_mode(request.mode, &request.text, embedding.as_ref())?;
        let built = build_query(&shape);
        let container = self.containers.resolve(request.index);

        debug!(
            mode = %request.mode,
            container = container.name(),
            phase = "query_executing",
            query = %built.display_text,
            "executing query"
        );

        let started = Instant::now();
        let response = container
            .query(&built.query_text, true)
            .await
            .map_err(|error| {
                warn!(container = container.name(), %error, "query failed");
                error
            })?;
        let query_time = started.elapsed();

        let request_charge = response.request_charge(container.name())?;
        let rows = response
            .rows
            .into_iter()
            .map(serde_json::from_value::<PaperRow>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        info!(
            mode = %request.mode,
            index = %request.index,
            rows = rows.len(),
            query_ms = query_time.as_secs_f64() * 1_000.0,
            request_charge,
            "search succeeded"
        );

        Ok(ExecutionResult {
            executed_query: built.display_text,
            mode: request.mode,
            index: request.index,
            rows,
            embedding_time,
            query_time,
            request_charge,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{EmbeddingVector, IndexSelection, SearchMode};
    use crate::store::{QueryResponse, REQUEST_CHARGE_HEADER};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeEmbedder {
        pub fail: bool,
        pub advertised_dimensions: Option<usize>,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn dimensions(&self) -> usize {
            self.advertised_dimensions.unwrap_or(4)
        }

        async fn embed(&self, _text: &str) -> Result<EmbeddingVector, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Provider {
                    status: 429,
                    details: "quota exceeded".to_string(),
                });
            }
            EmbeddingVector::new(vec![0.125, -0.25, 0.375, 0.5])
        }
    }

    pub(crate) struct FakeContainer {
        pub name: String,
        pub rows: Vec<Value>,
        pub charge: Option<String>,
        pub fail: bool,
        pub queries: Mutex<Vec<(String, bool)>>,
    }

    impl FakeContainer {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                rows: vec![
                    json!({"id": "1", "title": "Black hole entropy", "abstract": "Horizons.", "SimilarityScore": 0.91}),
                    json!({"id": "2", "title": "Fractal spacetime", "abstract": "Cantor sets."}),
                ],
                charge: Some("3.47".to_string()),
                fail: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        pub fn executed(&self) -> Vec<(String, bool)> {
            self.queries.lock().map(|queries| queries.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl DocumentContainer for FakeContainer {
        fn name(&self) -> &str {
            &self.name
        }

        async fn query(
            &self,
            query_text: &str,
            cross_partition: bool,
        ) -> Result<QueryResponse, StoreError> {
            if let Ok(mut queries) = self.queries.lock() {
                queries.push((query_text.to_string(), cross_partition));
            }
            if self.fail {
                return Err(StoreError::Rejected {
                    container: self.name.clone(),
                    status: 400,
                    details: "One of the input values is invalid.".to_string(),
                });
            }

            let mut response = QueryResponse {
                rows: self.rows.clone(),
                ..Default::default()
            };
            if let Some(charge) = &self.charge {
                response
                    .headers
                    .insert(REQUEST_CHARGE_HEADER.to_string(), charge.clone());
            }
            Ok(response)
        }
    }

    pub(crate) fn containers() -> ContainerSet<FakeContainer> {
        ContainerSet {
            no_index: FakeContainer::new("search"),
            qflat: FakeContainer::new("search_qflat"),
            diskann: FakeContainer::new("search_diskann"),
        }
    }

    #[tokio::test]
    async fn vector_search_records_embedding_and_query_metrics() -> Result<(), SearchError> {
        let executor = SearchExecutor::new(FakeEmbedder::default(), containers());
        let request = SearchRequest::new(SearchMode::Vector, "black holes", IndexSelection::DiskAnn);

        let result = executor.execute(&request).await?;

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].similarity_score, Some(0.91));
        assert_eq!(result.request_charge, 3.47);
        assert!(result.embedding_time.is_some());
        assert!(result.executed_query.contains("REDACTED"));

        let executed = executor.containers().diskann.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].0.contains("[0.125, -0.25, 0.375, 0.5]"));
        assert!(executed[0].1, "queries fan out across partitions");
        assert!(executor.containers().no_index.executed().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn keyword_search_skips_the_embedding_provider() -> Result<(), SearchError> {
        let executor = SearchExecutor::new(FakeEmbedder::default(), containers());
        let request = SearchRequest::new(
            SearchMode::FullTextAll,
            "fractal spacetime",
            IndexSelection::QuantizedFlat,
        );

        let result = executor.execute(&request).await?;

        assert_eq!(executor.embedder.calls.load(Ordering::SeqCst), 0);
        assert!(result.embedding_time.is_none());
        assert_eq!(
            result.executed_query,
            r#"SELECT TOP 10 l.id, l.title, l.abstract FROM l WHERE FullTextContainsAll(l.abstract, "fractal", "spacetime")"#
        );
        assert_eq!(executor.containers().qflat.executed().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn hybrid_search_stops_when_embedding_fails() {
        let embedder = FakeEmbedder {
            fail: true,
            ..Default::default()
        };
        let executor = SearchExecutor::new(embedder, containers());
        let request = SearchRequest::new(SearchMode::Hybrid, "quantum gravity", IndexSelection::NoIndex);

        let error = executor.execute(&request).await.unwrap_err();

        assert!(matches!(error, SearchError::Embedding(_)));
        for selection in IndexSelection::ALL {
            assert!(executor.containers().resolve(selection).executed().is_empty());
        }
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let mut set = containers();
        set.no_index = FakeContainer::failing("search");
        let executor = SearchExecutor::new(FakeEmbedder::default(), set);
        let request = SearchRequest::new(SearchMode::FullTextRank, "dark matter", IndexSelection::NoIndex);

        let error = executor.execute(&request).await.unwrap_err();
        assert!(matches!(error, SearchError::Store(StoreError::Rejected { status: 400, .. })));
    }

    #[tokio::test]
    async fn missing_request_charge_fails_the_request() {
        let mut set = containers();
        set.qflat.charge = None;
        let executor = SearchExecutor::new(FakeEmbedder::default(), set);
        let request = SearchRequest::new(SearchMode::FullTextAny, "entropy", IndexSelection::QuantizedFlat);

        let error = executor.execute(&request).await.unwrap_err();
        assert!(matches!(error, SearchError::Store(StoreError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn embedding_with_unexpected_dimensions_is_rejected() {
        let embedder = FakeEmbedder {
            advertised_dimensions: Some(1536),
            ..Default::default()
        };
        let executor = SearchExecutor::new(embedder, containers());
        let request = SearchRequest::new(SearchMode::Vector, "black holes", IndexSelection::NoIndex);

        let error = executor.execute(&request).await.unwrap_err();

        assert!(matches!(
            error,
            SearchError::Embedding(EmbeddingError::DimensionMismatch {
                expected: 1536,
                actual: 4
            })
        ));
        assert!(executor.containers().no_index.executed().is_empty());
    }

    #[tokio::test]
    async fn blank_text_never_reaches_the_provider() {
        let executor = SearchExecutor::new(FakeEmbedder::default(), containers());
        let request = SearchRequest::new(SearchMode::Vector, "   ", IndexSelection::NoIndex);

        let error = executor.execute(&request).await.unwrap_err();

        assert!(matches!(error, SearchError::Input(_)));
        assert_eq!(executor.embedder.calls.load(Ordering::SeqCst), 0);
    }
}
