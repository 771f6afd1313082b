pub mod config;
pub mod fixture;
pub mod run;

use std::path::PathBuf;

use clap::{Args, Subcommand};

use roundtrip_core::config::{EmbedderKind, RoundtripConfig};
use roundtrip_core::error::{ConfigError, HarnessError};
use roundtrip_core::fixture::FixtureCatalog;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the verification cases against a store and write the report
    Run(run::RunArgs),
    /// Show the fixture catalog the harness will load
    Fixture(fixture::FixtureArgs),
    /// Print the effective configuration as TOML
    Config(config::ConfigArgs),
}

pub async fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Run(args) => run::run(args, quiet).await,
        Command::Fixture(args) => fixture::run(&args),
        Command::Config(args) => config::run(&args),
    }
}

/// Configuration sources shared by every subcommand.
///
/// Precedence, lowest first: built-in defaults, `--config` file, environment,
/// explicit flags. Clap folds the last two together.
#[derive(Args, Debug, Default)]
pub struct Settings {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Store URI: http(s)://host:port, sqlite://<path> or sqlite::memory:
    #[arg(long, env = "NEO4J_URI")]
    pub uri: Option<String>,

    /// Database name on the Neo4j HTTP endpoint
    #[arg(long, env = "NEO4J_DATABASE")]
    pub database: Option<String>,

    #[arg(long, env = "NEO4J_USER")]
    pub user: Option<String>,

    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Namespace that scopes every entity the harness writes
    #[arg(long, env = "HARNESS_NAMESPACE")]
    pub namespace: Option<String>,

    /// Report destination
    #[arg(long, env = "TEST_RESULTS_FILE")]
    pub report: Option<PathBuf>,

    /// Embedding dimensionality pinned for the run
    #[arg(long)]
    pub dimensions: Option<usize>,

    /// Embedding provider: mock or openai
    #[arg(long, value_parser = ["mock", "openai"])]
    pub embedder: Option<String>,

    /// Fixture catalog (TOML) replacing the built-in one
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Results requested by the hybrid search case
    #[arg(long)]
    pub top_k: Option<usize>,
}

impl Settings {
    /// Merge every source into one configuration. Does not validate.
    pub fn resolve(&self) -> Result<RoundtripConfig, HarnessError> {
        let mut config = match &self.config {
            Some(path) => RoundtripConfig::load(path)?,
            None => RoundtripConfig::default(),
        };

        if let Some(uri) = &self.uri {
            config.store.uri.clone_from(uri);
        }
        if let Some(database) = &self.database {
            config.store.database.clone_from(database);
        }
        if let Some(user) = &self.user {
            config.store.username.clone_from(user);
        }
        if let Some(password) = &self.password {
            config.store.password.clone_from(password);
        }
        if let Some(namespace) = &self.namespace {
            config.store.namespace.clone_from(namespace);
        }
        if let Some(report) = &self.report {
            config.report.path.clone_from(report);
        }
        if let Some(dimensions) = self.dimensions {
            config.embedding.dimensions = dimensions;
        }
        if let Some(name) = &self.embedder {
            config.embedding.provider = EmbedderKind::parse(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown embedder `{name}`")))?;
        }
        if let Some(fixture) = &self.fixture {
            config.harness.fixture = Some(fixture.clone());
        }
        if let Some(top_k) = self.top_k {
            config.harness.top_k = top_k;
        }
        Ok(config)
    }
}

/// The catalog named in the configuration, or the built-in one.
pub fn load_catalog(config: &RoundtripConfig) -> Result<FixtureCatalog, HarnessError> {
    match &config.harness.fixture {
        Some(path) => Ok(FixtureCatalog::load(path)?),
        None => Ok(FixtureCatalog::health_care()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.toml");
        std::fs::write(
            &path,
            "[store]\nnamespace = \"from-file\"\npassword = \"pw\"\n\n[embedding]\ndimensions = 768\n",
        )
        .unwrap();

        let settings = Settings {
            config: Some(path),
            namespace: Some("from-flag".into()),
            embedder: Some("mock".into()),
            ..Settings::default()
        };
        let config = settings.resolve().unwrap();
        assert_eq!(config.store.namespace, "from-flag");
        assert_eq!(config.store.password, "pw");
        assert_eq!(config.embedding.dimensions, 768);
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let settings = Settings {
            config: Some(PathBuf::from("/nowhere/roundtrip.toml")),
            ..Settings::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(HarnessError::Config(ConfigError::NotFound(_)))
        ));
    }

    #[test]
    fn built_in_catalog_by_default() {
        let catalog = load_catalog(&RoundtripConfig::default()).unwrap();
        assert_eq!(catalog.entities().len(), 9);
        assert_eq!(catalog.relationships().len(), 17);
    }
}
