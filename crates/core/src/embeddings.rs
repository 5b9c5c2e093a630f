use crate::config::EmbeddingSettings;
use crate::error::EmbeddingError;
use crate::models::EmbeddingVector;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Azure OpenAI embeddings deployment.
pub struct AzureOpenAiEmbedder {
    client: Arc<Client>,
    url: Url,
    api_key: String,
    dimensions: usize,
}

impl AzureOpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: Arc::new(Client::new()),
            url: embeddings_url(settings)?,
            api_key: settings.api_key.clone(),
            dimensions: settings.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        debug!(chars = text.chars().count(), "requesting query embedding");

        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&json!({ "input": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                details,
            });
        }

        let body = response.bytes().await?;
        parse_embedding_response(&body, self.dimensions)
    }
}

fn embeddings_url(settings: &EmbeddingSettings) -> Result<Url, url::ParseError> {
    let base = format!("{}/", settings.endpoint.trim_end_matches('/'));
    let mut url = Url::parse(&base)?.join(&format!(
        "openai/deployments/{}/embeddings",
        settings.deployment
    ))?;
    url.query_pairs_mut()
        .append_pair("api-version", &settings.api_version);
    Ok(url)
}

fn parse_embedding_response(
    body: &[u8],
    dimensions: usize,
) -> Result<EmbeddingVector, EmbeddingError> {
    let parsed: EmbeddingResponse = serde_json::from_slice(body)
        .map_err(|error| EmbeddingError::MalformedResponse(error.to_string()))?;

    let values = parsed
        .data
        .into_iter()
        .next()
        .map(|item| item.embedding)
        .ok_or_else(|| EmbeddingError::MalformedResponse("response has no data".to_string()))?;

    if values.len() != dimensions {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimensions,
            actual: values.len(),
        });
    }

    EmbeddingVector::new(values)
}
