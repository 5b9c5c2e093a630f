use crate::error::ConfigError;
use base64::{engine::general_purpose::STANDARD, Engine};
use url::Url;

pub const DEFAULT_DATABASE: &str = "a-ignite2024demo";
pub const DEFAULT_EMBEDDING_API_VERSION: &str = "2023-05-15";
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNames {
    pub no_index: String,
    pub qflat: String,
    pub diskann: String,
}

impl Default for ContainerNames {
    fn default() -> Self {
        Self {
            no_index: "search".to_string(),
            qflat: "search_qflat".to_string(),
            diskann: "search_diskann".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CosmosSettings {
    pub endpoint: String,
    /// Base64 account master key.
    pub key: String,
    pub database: String,
    pub containers: ContainerNames,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub cosmos: CosmosSettings,
    pub embedding: EmbeddingSettings,
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cosmos = &self.cosmos;
        require("cosmos endpoint", &cosmos.endpoint)?;
        require("cosmos key", &cosmos.key)?;
        require("cosmos database", &cosmos.database)?;
        require("no-index container", &cosmos.containers.no_index)?;
        require("qflat container", &cosmos.containers.qflat)?;
        require("diskann container", &cosmos.containers.diskann)?;
        Url::parse(&cosmos.endpoint)?;
        STANDARD
            .decode(cosmos.key.trim())
            .map_err(|error| ConfigError::Invalid {
                field: "cosmos key",
                details: error.to_string(),
            })?;

        let embedding = &self.embedding;
        require("embedding endpoint", &embedding.endpoint)?;
        require("embedding api key", &embedding.api_key)?;
        require("embedding api version", &embedding.api_version)?;
        require("embedding deployment", &embedding.deployment)?;
        Url::parse(&embedding.endpoint)?;
        if embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding dimensions",
                details: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    Ok(())
}
