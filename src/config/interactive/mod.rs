#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{BedrockConfig, Config, ConfigError, EmbeddingConfig, EmbeddingProviderKind};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Carchat Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Bedrock Configuration").bold().yellow());
    eprintln!("Configure the hosted models used for chat and image identification.");
    eprintln!();
    configure_bedrock(&mut config.bedrock)?;

    eprintln!();
    eprintln!("{}", style("Embedding Configuration").bold().yellow());
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    if config.bedrock.api_key().is_none() {
        eprintln!(
            "{}",
            style(format!(
                "⚠ Warning: environment variable {} is not set",
                config.bedrock.api_key_env
            ))
            .yellow()
        );
        eprintln!("Chat requests will fail until the API key is exported.");
    } else {
        eprintln!("{}", style("✓ Bedrock API key found").green());
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    for line in describe_config(&config) {
        eprintln!("{}", line);
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

/// Human-readable summary lines, shared by `config --show` and `status`
pub fn describe_config(config: &Config) -> Vec<String> {
    let mut lines = vec![
        "Bedrock Settings:".to_string(),
        format!("  Region: {}", config.bedrock.region),
        format!(
            "  Endpoint: {}",
            config
                .bedrock
                .endpoint_url()
                .map_or_else(|e| format!("Invalid ({})", e), |url| url.to_string())
        ),
        format!("  Text model: {}", config.bedrock.text_model),
        format!("  Vision model: {}", config.bedrock.vision_model),
        format!("  API key variable: {}", config.bedrock.api_key_env),
        "Embedding Settings:".to_string(),
    ];

    match config.embedding.provider {
        EmbeddingProviderKind::Ollama => {
            let ollama = &config.embedding.ollama;
            lines.push(format!(
                "  Provider: Ollama ({}://{}:{})",
                ollama.protocol, ollama.host, ollama.port
            ));
            lines.push(format!("  Model: {}", ollama.model));
        }
        EmbeddingProviderKind::Bedrock => {
            lines.push("  Provider: Bedrock".to_string());
            lines.push(format!("  Model: {}", config.embedding.titan_model));
        }
    }
    lines.push(format!("  Dimension: {}", config.embedding.dimension));

    lines.push("Retrieval Settings:".to_string());
    lines.push(format!("  Chat k: {}", config.retrieval.chat_k));
    lines.push(format!("  Image k: {}", config.retrieval.image_k));

    lines.push(match &config.guardrail {
        Some(guardrail) => format!("Guardrail: {} (version {})", guardrail.id, guardrail.version),
        None => "Guardrail: disabled".to_string(),
    });

    let pairs: Vec<String> = config
        .comparison
        .pairs
        .iter()
        .map(|(first, second)| format!("{} / {}", first, second))
        .collect();
    lines.push(format!("Comparison pairs: {}", pairs.join(", ")));
    lines.push(format!(
        "Enforce link contract: {}",
        config.links.enforce_link_contract
    ));

    lines
}

fn load_existing_config() -> Result<Config> {
    Config::load_default().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_bedrock(bedrock: &mut BedrockConfig) -> Result<()> {
    let region: String = Input::new()
        .with_prompt("AWS region")
        .default(bedrock.region.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Region cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let text_model: String = Input::new()
        .with_prompt("Text model id")
        .default(bedrock.text_model.clone())
        .validate_with(validate_model_name)
        .interact_text()?;

    let vision_model: String = Input::new()
        .with_prompt("Vision model id")
        .default(bedrock.vision_model.clone())
        .validate_with(validate_model_name)
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(bedrock.api_key_env.clone())
        .interact_text()?;

    let candidate = BedrockConfig {
        region,
        text_model,
        vision_model,
        api_key_env,
        ..bedrock.clone()
    };
    candidate.validate()?;
    *bedrock = candidate;

    Ok(())
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let providers = &["ollama", "bedrock"];
    let default_index = match embedding.provider {
        EmbeddingProviderKind::Ollama => 0,
        EmbeddingProviderKind::Bedrock => 1,
    };

    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_index)
        .items(providers)
        .interact()?;

    if provider_index == 0 {
        embedding.provider = EmbeddingProviderKind::Ollama;

        let host: String = Input::new()
            .with_prompt("Ollama host")
            .default(embedding.ollama.host.clone())
            .interact_text()?;

        let port: u16 = Input::new()
            .with_prompt("Ollama port")
            .default(embedding.ollama.port)
            .validate_with(|input: &u16| -> Result<(), ConfigError> {
                if *input == 0 {
                    Err(ConfigError::InvalidPort(*input))
                } else {
                    Ok(())
                }
            })
            .interact_text()?;

        let model: String = Input::new()
            .with_prompt("Embedding model")
            .default(embedding.ollama.model.clone())
            .validate_with(validate_model_name)
            .interact_text()?;

        embedding.ollama.set_host(host)?;
        embedding.ollama.set_port(port)?;
        embedding.ollama.set_model(model)?;
    } else {
        embedding.provider = EmbeddingProviderKind::Bedrock;

        embedding.titan_model = Input::new()
            .with_prompt("Titan embedding model id")
            .default(embedding.titan_model.clone())
            .validate_with(validate_model_name)
            .interact_text()?;
    }

    Ok(())
}

#[expect(clippy::ptr_arg, reason = "dialoguer validators receive &String")]
fn validate_model_name(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}
