use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for persisted session artifacts.
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1500
}
fn default_overlap_chars() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Neighbor fan-out of the ANN graph.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    /// Beam width used during graph search; higher is more exact.
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            ef_search: default_ef_search(),
        }
    }
}

fn default_fan_out() -> usize {
    32
}
fn default_ef_search() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Weight of the dense (vector) contribution in ensemble fusion.
    #[serde(default = "default_weight")]
    pub vector_weight: f64,
    /// Weight of the sparse (BM25) contribution in ensemble fusion.
    #[serde(default = "default_weight")]
    pub lexical_weight: f64,
    /// Rank-fusion smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    /// Number of fused matches returned per query.
    #[serde(default = "default_final_k")]
    pub final_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_weight(),
            lexical_weight: default_weight(),
            rrf_k: default_rrf_k(),
            final_k: default_final_k(),
        }
    }
}

fn default_weight() -> f64 {
    0.5
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_final_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    1536
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
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

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_model")]
    pub model: String,
    /// Low temperature for reproducible rankings.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: default_analysis_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

fn default_analysis_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_analysis_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Construct a config rooted at `data_dir` with defaults everywhere else.
    /// Intended for library callers and tests; the CLI loads a TOML file.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                data_dir: data_dir.into(),
            },
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 {
            anyhow::bail!("chunking.max_chars must be > 0");
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
        }
        if self.index.fan_out == 0 {
            anyhow::bail!("index.fan_out must be > 0");
        }
        if self.index.ef_search == 0 {
            anyhow::bail!("index.ef_search must be > 0");
        }
        if self.retrieval.final_k < 1 {
            anyhow::bail!("retrieval.final_k must be >= 1");
        }
        if self.retrieval.vector_weight < 0.0 || self.retrieval.lexical_weight < 0.0 {
            anyhow::bail!("retrieval weights must be >= 0");
        }
        if self.retrieval.vector_weight + self.retrieval.lexical_weight <= 0.0 {
            anyhow::bail!("at least one retrieval weight must be > 0");
        }
        if self.retrieval.rrf_k <= 0.0 {
            anyhow::bail!("retrieval.rrf_k must be > 0");
        }
        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if !(0.0..=2.0).contains(&self.analysis.temperature) {
            anyhow::bail!("analysis.temperature must be in [0.0, 2.0]");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::with_data_dir("/tmp/rmx");
        assert_eq!(config.chunking.max_chars, 1500);
        assert_eq!(config.chunking.overlap_chars, 150);
        assert_eq!(config.index.fan_out, 32);
        assert!((config.retrieval.vector_weight - 0.5).abs() < 1e-9);
        assert!((config.retrieval.lexical_weight - 0.5).abs() < 1e-9);
        assert_eq!(config.retrieval.final_k, 5);
        assert!((config.analysis.temperature - 0.3).abs() < 1e-9);
        config.validate().unwrap();
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        let mut config = Config::with_data_dir("/tmp/rmx");
        config.chunking.overlap_chars = config.chunking.max_chars;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = Config::with_data_dir("/tmp/rmx");
        config.retrieval.vector_weight = 0.0;
        config.retrieval.lexical_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "./data"

            [retrieval]
            vector_weight = 0.7
            lexical_weight = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert!((config.retrieval.vector_weight - 0.7).abs() < 1e-9);
        assert_eq!(config.chunking.max_chars, 1500);
        config.validate().unwrap();
    }
}
