// Configuration management module
// TOML configuration for the model providers, retrieval and prompt settings

pub mod interactive;
pub mod settings;

pub use interactive::{describe_config, run_interactive_config, show_config};
pub use settings::{
    BedrockConfig, ComparisonConfig, Config, ConfigError, EmbeddingConfig, EmbeddingProviderKind,
    GenerationConfig, GuardrailConfig, LinkConfig, OllamaConfig, RetrievalConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
