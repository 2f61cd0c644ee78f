//! Configuration parsing and validation.
//!
//! The engine is configured via a TOML file (default: `./llmc.toml`). The
//! config defines the catalog database path, the indexer's working-tree
//! scope, embedding profiles, enrichment chains and routing rules, daemon
//! scheduling parameters, and docgen output limits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub semantic_cache: SemanticCacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".llmc/index_v2.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_ragignore_file")]
    pub ragignore_file: String,
    #[serde(default)]
    pub extra_blocklist: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            ragignore_file: default_ragignore_file(),
            extra_blocklist: Vec::new(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_ragignore_file() -> String {
    ".ragignore".to_string()
}

/// Paths/directories that are always excluded from the working-tree walk,
/// regardless of `.ragignore` or VCS ignore rules.
pub const FIXED_BLOCKLIST: &[&str] = &[
    ".git",
    ".llmc",
    "target",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    "dist",
    "build",
];

// ============ Embeddings ============

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub profiles: HashMap<String, EmbeddingProfileConfig>,
}

impl EmbeddingsConfig {
    pub fn profile(&self, name: &str) -> Result<&EmbeddingProfileConfig> {
        self.profiles
            .get(name)
            .with_context(|| format!("no embedding profile named '{}'", name))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingProfileConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingProfileConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingProfileConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

// ============ Enrichment ============

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub chains: HashMap<String, EnrichmentChainConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub placeholder_phrases: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentChainConfig {
    pub backends: Vec<BackendSpecConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSpecConfig {
    pub backend_id: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
}

fn default_backend_timeout_ms() -> u64 {
    30_000
}
fn default_max_failures() -> u32 {
    3
}
fn default_cooldown_secs() -> i64 {
    600
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RouterConfig {
    #[serde(default)]
    pub rules: Vec<RouterRuleConfig>,
    pub catch_all: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterRuleConfig {
    pub when: String,
    pub chain: String,
}

// ============ Daemon ============

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_housekeeping_interval_secs")]
    pub housekeeping_interval_secs: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_poll_min_secs")]
    pub poll_min_secs: u64,
    #[serde(default = "default_poll_max_secs")]
    pub poll_max_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            housekeeping_interval_secs: default_housekeeping_interval_secs(),
            max_workers: default_max_workers(),
            poll_min_secs: default_poll_min_secs(),
            poll_max_secs: default_poll_max_secs(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    2000
}
fn default_housekeeping_interval_secs() -> u64 {
    300
}
fn default_max_workers() -> usize {
    4
}
fn default_poll_min_secs() -> u64 {
    180
}
fn default_poll_max_secs() -> u64 {
    1800
}

// ============ Docs / docgen ============

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default)]
    pub docgen: DocgenConfig,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            docgen: DocgenConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocgenConfig {
    #[serde(default = "default_docgen_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_docgen_max_bytes")]
    pub max_bytes: u64,
}

impl Default for DocgenConfig {
    fn default() -> Self {
        Self {
            output_dir: default_docgen_output_dir(),
            max_bytes: default_docgen_max_bytes(),
        }
    }
}

fn default_docgen_output_dir() -> PathBuf {
    PathBuf::from("DOCS/REPODOCS")
}
fn default_docgen_max_bytes() -> u64 {
    1_048_576
}

// ============ Semantic cache ============

#[derive(Debug, Deserialize, Clone)]
pub struct SemanticCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_max_entries() -> usize {
    10_000
}

// ============ Server ============

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
        }
    }
}

fn default_server_bind() -> String {
    "127.0.0.1:8787".to_string()
}

// ============ Loading & validation ============

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    for (name, profile) in &config.embeddings.profiles {
        if profile.is_enabled() {
            if profile.dims.is_none() || profile.dims == Some(0) {
                anyhow::bail!(
                    "embeddings.profiles.{}.dims must be > 0 when provider is '{}'",
                    name,
                    profile.provider
                );
            }
            if profile.model.is_none() {
                anyhow::bail!(
                    "embeddings.profiles.{}.model must be specified when provider is '{}'",
                    name,
                    profile.provider
                );
            }
        }
        match profile.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" | "hash" => {}
            other => anyhow::bail!(
                "embeddings.profiles.{}: unknown provider '{}'. Must be disabled, openai, ollama, local, or hash.",
                name,
                other
            ),
        }
    }

    for (name, chain) in &config.enrichment.chains {
        if chain.backends.is_empty() {
            anyhow::bail!("enrichment.chains.{} must list at least one backend", name);
        }
    }

    if !config.enrichment.chains.is_empty() && config.enrichment.router.catch_all.is_none() {
        anyhow::bail!("enrichment.router.catch_all is required when any enrichment chain is configured");
    }

    if let Some(ref catch_all) = config.enrichment.router.catch_all {
        if !config.enrichment.chains.contains_key(catch_all) {
            anyhow::bail!(
                "enrichment.router.catch_all '{}' does not name a configured chain",
                catch_all
            );
        }
    }

    if config.daemon.poll_min_secs == 0 || config.daemon.poll_max_secs < config.daemon.poll_min_secs
    {
        anyhow::bail!("daemon.poll_min_secs/poll_max_secs must satisfy 0 < min <= max");
    }

    if config.daemon.max_workers == 0 {
        anyhow::bail!("daemon.max_workers must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let f = write_temp_config("");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.daemon.debounce_ms, 2000);
        assert_eq!(config.daemon.housekeeping_interval_secs, 300);
        assert_eq!(config.db.path, PathBuf::from(".llmc/index_v2.db"));
    }

    #[test]
    fn embedding_profile_without_dims_is_rejected() {
        let f = write_temp_config(
            r#"
            [embeddings.profiles.code]
            provider = "openai"
            model = "text-embedding-3-small"
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn router_without_catch_all_is_rejected_when_chains_present() {
        let f = write_temp_config(
            r#"
            [enrichment.chains.default]
            backends = [{ backend_id = "primary" }]
            "#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn valid_router_config_loads() {
        let f = write_temp_config(
            r#"
            [enrichment.chains.default]
            backends = [{ backend_id = "primary" }]

            [enrichment.router]
            catch_all = "default"
            "#,
        );
        assert!(load_config(f.path()).is_ok());
    }
}
