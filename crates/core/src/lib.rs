pub mod config;
pub mod embeddings;
pub mod error;
pub mod executor;
pub mod models;
pub mod query;
pub mod session;
pub mod store;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use config::{
    ContainerNames, CosmosSettings, EmbeddingSettings, SearchSettings, DEFAULT_DATABASE,
    DEFAULT_EMBEDDING_API_VERSION, DEFAULT_EMBEDDING_DEPLOYMENT, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use embeddings::AzureOpenAiEmbedder;
pub use error::{ConfigError, EmbeddingError, SearchError, StoreError};
pub use executor::SearchExecutor;
pub use models::{
    EmbeddingVector, ExecutionResult, IndexSelection, PaperRow, SearchMode, SearchRequest,
};
pub use query::{build_query, BuiltQuery, Containment, Keywords, QueryShape, REDACTION_MARKER, TOP_N};
pub use session::{CosmosSession, SearchSession, SessionStatus};
pub use store::{ContainerSet, QueryResponse, REQUEST_CHARGE_HEADER};
pub use stores::{CosmosClient, CosmosContainer};
pub use traits::{DocumentContainer, EmbeddingProvider};
