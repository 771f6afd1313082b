use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::SimilarityFunction;

/// Top-level harness configuration, matching `roundtrip.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundtripConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub schema: SchemaSection,
    #[serde(default)]
    pub harness: HarnessSection,
    #[serde(default)]
    pub report: ReportSection,
}

impl RoundtripConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate everything that must hold before any store operation begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.store.uri, "store.uri")?;
        require(&self.store.username, "store.username")?;
        require(&self.store.password, "store.password")?;
        require(&self.store.namespace, "store.namespace")?;
        require(&self.schema.index_name, "schema.index_name")?;

        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimensions must be greater than zero".into(),
            ));
        }
        if self.embedding.provider == EmbedderKind::OpenAi && self.embedding.model.trim().is_empty()
        {
            return Err(ConfigError::Missing("embedding.model"));
        }
        if self.schema.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "schema.batch_size must be greater than zero".into(),
            ));
        }
        if self.harness.top_k == 0 {
            return Err(ConfigError::Invalid(
                "harness.top_k must be greater than zero".into(),
            ));
        }
        if self.harness.case_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "harness.case_timeout_secs must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.harness.min_self_similarity) {
            return Err(ConfigError::Invalid(format!(
                "harness.min_self_similarity must be within 0.0..=1.0, got {}",
                self.harness.min_self_similarity
            )));
        }
        if self.report.path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("report.path"));
        }
        Ok(())
    }
}

fn require(value: &str, name: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(())
    }
}

/// Connection to the store under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// `http(s)://host:port` for Neo4j, `sqlite://<path>` or `sqlite::memory:`.
    pub uri: String,
    /// Database name for the Neo4j HTTP endpoint.
    pub database: String,
    pub username: String,
    pub password: String,
    /// Every entity this harness writes is scoped to this namespace.
    pub namespace: String,
    pub request_timeout_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
            namespace: "roundtrip".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Which embedder produces vectors for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Mock,
    #[serde(rename = "openai")]
    OpenAi,
}

impl EmbedderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mock" => Some(Self::Mock),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Pinned dimensionality for the run; index and embedder must both agree.
    pub dimensions: usize,
    pub similarity: SimilarityFunction,
    pub provider: EmbedderKind,
    /// Seed mixed into every mock vector.
    pub mock_seed: u64,
    pub model: String,
    /// Name of the environment variable holding the provider API key.
    pub api_key_env: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            dimensions: 1536,
            similarity: SimilarityFunction::Cosine,
            provider: EmbedderKind::Mock,
            mock_seed: 42,
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
        }
    }
}

/// What to do when the existing index was built with another dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    #[default]
    Fail,
    Recreate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSection {
    pub index_name: String,
    pub on_dimension_mismatch: MismatchPolicy,
    pub index_online_timeout_secs: u64,
    pub index_poll_interval_ms: u64,
    /// Entities per write statement.
    pub batch_size: usize,
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            index_name: "roundtrip_entity_embedding".to_string(),
            on_dimension_mismatch: MismatchPolicy::Fail,
            index_online_timeout_secs: 60,
            index_poll_interval_ms: 500,
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSection {
    pub case_timeout_secs: u64,
    /// Results requested by the hybrid search case.
    pub top_k: usize,
    pub min_self_similarity: f64,
    /// Custom fixture catalog (TOML). The built-in catalog is used when unset.
    pub fixture: Option<PathBuf>,
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            case_timeout_secs: 30,
            top_k: 3,
            min_self_similarity: 0.99,
            fixture: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub path: PathBuf,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("test_results.md"),
        }
    }
}
