// Remote embedding providers and the embedder factory.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EmbedderKind, EmbeddingSection};
use crate::error::{ConfigError, EmbedError, HarnessError};

use super::{Embedder, MockEmbedder};

// ── OpenAI-compatible provider ──────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimensions: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: String, dimensions: usize) -> Self {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        Self {
            client: Client::new(),
            api_key,
            model,
            dimensions,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> crate::error::Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };

        debug!(model = %self.model, dimensions = self.dimensions, "Calling embeddings API");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| HarnessError::Embed(EmbedError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(HarnessError::Embed(EmbedError::ApiError { status, body: text }));
        }

        let result: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| HarnessError::Embed(EmbedError::Parse(e.to_string())))?;

        let embedding = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| HarnessError::Embed(EmbedError::Parse("empty data array".into())))?;

        check_length(embedding, self.dimensions, &self.model)
    }
}

/// Reject a vector whose length differs from the pinned dimensionality.
fn check_length(embedding: Vec<f32>, expected: usize, model: &str) -> crate::error::Result<Vec<f32>> {
    if embedding.len() == expected {
        Ok(embedding)
    } else {
        Err(HarnessError::Config(ConfigError::DimensionMismatch {
            expected,
            actual: embedding.len(),
            context: format!("embedding model `{model}`"),
        }))
    }
}

// ── Factory ─────────────────────────────────────────────────────────

/// Build the configured embedder. Remote providers read their key from the
/// environment variable named in `api_key_env`.
pub fn create_embedder(section: &EmbeddingSection) -> crate::error::Result<Box<dyn Embedder>> {
    match section.provider {
        EmbedderKind::Mock => Ok(Box::new(MockEmbedder::new(
            section.dimensions,
            section.mock_seed,
        ))),
        EmbedderKind::OpenAi => {
            let api_key = std::env::var(&section.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    HarnessError::Config(ConfigError::Invalid(format!(
                        "embedding provider `openai` needs an API key in ${}",
                        section.api_key_env
                    )))
                })?;
            let mut p = OpenAiEmbedder::new(api_key, section.model.clone(), section.dimensions);
            if let Some(url) = &section.base_url {
                p = p.with_base_url(url.clone());
            }
            Ok(Box::new(p))
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_mock_with_pinned_dimensions() {
        let section = EmbeddingSection {
            dimensions: 768,
            ..EmbeddingSection::default()
        };
        let embedder = create_embedder(&section).unwrap();
        assert_eq!(embedder.name(), "mock");
        assert_eq!(embedder.dimensions(), 768);
    }

    #[test]
    fn openai_without_key_is_a_config_error() {
        let section = EmbeddingSection {
            provider: EmbedderKind::OpenAi,
            api_key_env: "ROUNDTRIP_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..EmbeddingSection::default()
        };
        let err = create_embedder(&section).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn wrong_length_is_a_dimension_mismatch() {
        let err = check_length(vec![0.0; 768], 1536, "text-embedding-3-small").unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::DimensionMismatch {
                expected: 1536,
                actual: 768,
                ..
            })
        ));
        assert!(check_length(vec![0.0; 4], 4, "m").is_ok());
    }

    #[test]
    fn base_url_is_trimmed() {
        let p = OpenAiEmbedder::new("k".into(), "m".into(), 8)
            .with_base_url("http://localhost:8080/".into());
        assert_eq!(p.base_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_network_error() {
        let p = OpenAiEmbedder::new("k".into(), "m".into(), 8)
            .with_base_url("http://127.0.0.1:1".into());
        let err = p.embed("hello").await.unwrap_err();
        assert!(matches!(err, HarnessError::Embed(EmbedError::Network(_))));
    }
}
