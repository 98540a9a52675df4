use super::describe_config;
use crate::config::{Config, EmbeddingProviderKind, GuardrailConfig};

#[test]
fn describe_default_config() {
    let lines = describe_config(&Config::default());

    assert!(lines.iter().any(|l| l.contains("Region: us-east-1")));
    assert!(lines.iter().any(|l| l.contains("Provider: Ollama")));
    assert!(lines.iter().any(|l| l == "Guardrail: disabled"));
    assert!(lines.iter().any(|l| l.contains("쏘나타 / K5")));
}

#[test]
fn describe_bedrock_embeddings_and_guardrail() {
    let mut config = Config::default();
    config.embedding.provider = EmbeddingProviderKind::Bedrock;
    config.guardrail = Some(GuardrailConfig {
        id: "gr-1".to_string(),
        version: "3".to_string(),
        trace: false,
    });

    let lines = describe_config(&config);

    assert!(lines.iter().any(|l| l == "  Provider: Bedrock"));
    assert!(
        lines
            .iter()
            .any(|l| l.contains("amazon.titan-embed-text-v2:0"))
    );
    assert!(lines.iter().any(|l| l == "Guardrail: gr-1 (version 3)"));
}
