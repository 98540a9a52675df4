
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;
/// Output sizes the Titan text embedding model accepts
pub const TITAN_DIMENSIONS: [u32; 3] = [256, 512, 1024];
const DEFAULT_API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";
const DEFAULT_TEXT_MODEL: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
const DEFAULT_TITAN_MODEL: &str = "amazon.titan-embed-text-v2:0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub bedrock: BedrockConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrail: Option<GuardrailConfig>,
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default)]
    pub links: LinkConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BedrockConfig {
    pub region: String,
    /// Overrides the regional runtime endpoint, e.g. for a VPC endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Environment variable holding the Bedrock API key
    pub api_key_env: String,
    pub text_model: String,
    pub vision_model: String,
    pub timeout_secs: u64,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_TEXT_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Ollama,
    Bedrock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub dimension: u32,
    pub titan_model: String,
    pub ollama: OllamaConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            titan_model: DEFAULT_TITAN_MODEL.to_string(),
            ollama: OllamaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "bge-m3:latest".to_string(),
            batch_size: 16,
        }
    }
}

/// Number of documents retrieved per call site
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chat_k: usize,
    pub image_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chat_k: 20,
            image_k: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub chat_max_tokens: u32,
    pub chat_temperature: f32,
    pub vision_max_tokens: u32,
    pub vision_temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chat_max_tokens: 2048,
            chat_temperature: 0.3,
            vision_max_tokens: 512,
            vision_temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardrailConfig {
    pub id: String,
    #[serde(default = "default_guardrail_version")]
    pub version: String,
    #[serde(default)]
    pub trace: bool,
}

fn default_guardrail_version() -> String {
    "DRAFT".to_string()
}

/// Keyword and entity lists that switch the composer into side-by-side mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ComparisonConfig {
    pub keywords: Vec<String>,
    pub pairs: Vec<(String, String)>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            keywords: ["비교", "vs", "차이", "뭐가 더", "어느 게", "나아"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            pairs: vec![("쏘나타".to_string(), "K5".to_string())],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct LinkConfig {
    /// Append a templated link when the model answer carries none
    pub enforce_link_contract: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid region: {0} (cannot be empty)")]
    InvalidRegion(String),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Unsupported Titan embedding dimension: {0} (must be 256, 512 or 1024)")]
    UnsupportedTitanDimension(u32),
    #[error("Invalid retrieval count: {0} (must be between 1 and 100)")]
    InvalidRetrievalCount(usize),
    #[error("Invalid max tokens: {0} (must be between 1 and 8192)")]
    InvalidMaxTokens(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 1.0)")]
    InvalidTemperature(f32),
    #[error("Invalid guardrail identifier (cannot be empty)")]
    InvalidGuardrail,
    #[error("Invalid comparison pair: ({0}, {1})")]
    InvalidComparisonPair(String, String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bedrock: BedrockConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            guardrail: None,
            comparison: ComparisonConfig::default(),
            links: LinkConfig::default(),
            base_dir: Self::config_dir().unwrap_or_else(|_| PathBuf::from(".carchat")),
        }
    }
}

impl Config {
    /// Resolve `~/.carchat`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".carchat"))
            .or_else(|| dirs::data_dir().map(|data| data.join("carchat")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default configuration directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::config_dir().context("Failed to resolve configuration directory")?;
        Self::load(dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bedrock.validate()?;
        self.embedding.validate()?;
        self.validate_retrieval()?;
        self.validate_generation()?;

        if let Some(guardrail) = &self.guardrail {
            if guardrail.id.trim().is_empty() || guardrail.version.trim().is_empty() {
                return Err(ConfigError::InvalidGuardrail);
            }
        }

        for (first, second) in &self.comparison.pairs {
            if first.trim().is_empty() || second.trim().is_empty() || first == second {
                return Err(ConfigError::InvalidComparisonPair(
                    first.clone(),
                    second.clone(),
                ));
            }
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        for k in [self.retrieval.chat_k, self.retrieval.image_k] {
            if !(1..=100).contains(&k) {
                return Err(ConfigError::InvalidRetrievalCount(k));
            }
        }
        Ok(())
    }

    fn validate_generation(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;

        for max_tokens in [generation.chat_max_tokens, generation.vision_max_tokens] {
            if !(1..=8192).contains(&max_tokens) {
                return Err(ConfigError::InvalidMaxTokens(max_tokens));
            }
        }

        for temperature in [generation.chat_temperature, generation.vision_temperature] {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(ConfigError::InvalidTemperature(temperature));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the persisted knowledge index directory
    #[inline]
    pub fn knowledge_path(&self) -> PathBuf {
        self.get_base_dir().join("knowledge")
    }
}

impl BedrockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::InvalidRegion(self.region.clone()));
        }

        self.endpoint_url()?;

        if self.text_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.text_model.clone()));
        }

        if self.vision_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.vision_model.clone()));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    /// The runtime endpoint, either the override or the regional default
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url_str = self.endpoint.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
        });
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    /// Read the API key from the configured environment variable
    #[inline]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        match self.provider {
            EmbeddingProviderKind::Ollama => self.ollama.validate(),
            EmbeddingProviderKind::Bedrock => {
                if self.titan_model.trim().is_empty() {
                    return Err(ConfigError::InvalidModel(self.titan_model.clone()));
                }
                if !TITAN_DIMENSIONS.contains(&self.dimension) {
                    return Err(ConfigError::UnsupportedTitanDimension(self.dimension));
                }
                Ok(())
            }
        }
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }
}
