use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding provider returned {status}: {details}")]
    Provider { status: u16, details: String },

    #[error("invalid embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding is empty")]
    Empty,

    #[error("embedding component {index} is not finite")]
    NonFinite { index: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{container} rejected the query with {status}: {details}")]
    Rejected {
        container: String,
        status: u16,
        details: String,
    },

    #[error("invalid response from {container}: {details}")]
    BackendResponse { container: String, details: String },

    #[error("{container} query plan needs {feature}, which this client cannot merge")]
    Unsupported {
        container: String,
        feature: &'static str,
    },

    #[error("request signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("query execution failed: {0}")]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    Input(String),
}

impl SearchError {
    /// Single-line message shown to the user when a request fails.
    pub fn user_message(&self) -> String {
        format!("An error occurred: {self}")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {details}")]
    Invalid {
        field: &'static str,
        details: String,
    },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
