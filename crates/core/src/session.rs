use crate::config::SearchSettings;
use crate::embeddings::AzureOpenAiEmbedder;
use crate::error::{ConfigError, SearchError};
use crate::executor::SearchExecutor;
use crate::models::{ExecutionResult, SearchRequest};
use crate::stores::{CosmosClient, CosmosContainer};
use crate::traits::{DocumentContainer, EmbeddingProvider};
use tracing::{info, warn};

/// Outcome of the most recent request.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Idle,
    Succeeded,
    Failed(String),
}

/// Application context created once at startup. Holds the store and embedding
/// handles for the session lifetime and the last published result.
///
/// `submit` takes `&mut self`, so a session never has more than one request in
/// flight.
pub struct SearchSession<E, C>
where
    E: EmbeddingProvider,
    C: DocumentContainer,
{
    executor: SearchExecutor<E, C>,
    last_result: Option<ExecutionResult>,
    status: SessionStatus,
}

pub type CosmosSession = SearchSession<AzureOpenAiEmbedder, CosmosContainer>;

impl CosmosSession {
    pub fn connect(settings: &SearchSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let client = CosmosClient::new(&settings.cosmos.endpoint, &settings.cosmos.key)?;
        let containers = client.containers(&settings.cosmos)?;
        let embedder =
            AzureOpenAiEmbedder::new(&settings.embedding).map_err(|error| ConfigError::Invalid {
                field: "embedding endpoint",
                details: error.to_string(),
            })?;

        info!(
            database = %settings.cosmos.database,
            deployment = %settings.embedding.deployment,
            dimensions = settings.embedding.dimensions,
            "search session connected"
        );

        Ok(Self::new(SearchExecutor::new(embedder, containers)))
    }
}

impl<E, C> SearchSession<E, C>
where
    E: EmbeddingProvider + Send + Sync,
    C: DocumentContainer + Send + Sync,
{
    pub fn new(executor: SearchExecutor<E, C>) -> Self {
        Self {
            executor,
            last_result: None,
            status: SessionStatus::Idle,
        }
    }

    pub fn last_result(&self) -> Option<&ExecutionResult> {
        self.last_result.as_ref()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Runs `request` and publishes its result. On failure the previous result
    /// stays in place and the error's user-facing message is recorded.
    pub async fn submit(&mut self, request: SearchRequest) -> Result<&ExecutionResult, SearchError> {
        match self.executor.execute(&request).await {
            Ok(result) => {
                self.status = SessionStatus::Succeeded;
                Ok(self.last_result.insert(result))
            }
            Err(error) => {
                warn!(mode = %request.mode, index = %request.index, %error, "search failed");
                self.status = SessionStatus::Failed(error.user_message());
                Err(error)
            }
        }
    }

    /// Releases the store and embedding handles.
    pub fn shutdown(self) {
        let (embedder, containers) = self.executor.into_parts();
        let names: Vec<String> = containers
            .into_vec()
            .iter()
            .map(|container| container.name().to_string())
            .collect();
        drop(embedder);
        info!(containers = ?names, "search session closed");
    }
}
