use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::chat::ChatEngine;
use crate::config::{Config, EmbeddingProviderKind, describe_config};
use crate::embeddings::{OllamaEmbedder, provider_from_config};
use crate::knowledge::KnowledgeStore;
use crate::knowledge::ingest::load_records;
use crate::mcp::McpServer;
use crate::mcp::tools::register_chat_tools;
use crate::model::{BedrockClient, ImageFormat};

fn load_config() -> Result<Config> {
    Config::load_default().context("Failed to load configuration")
}

async fn open_store(config: &Config) -> Result<Arc<KnowledgeStore>> {
    let embedder = provider_from_config(config)?;
    let path = config.knowledge_path();
    let store = KnowledgeStore::open(&path, embedder)
        .await
        .with_context(|| format!("Failed to open knowledge store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Open the knowledge store and hosted model named by `config`
#[inline]
pub async fn build_engine(config: &Config) -> Result<ChatEngine> {
    let store = open_store(config).await?;

    let client = BedrockClient::new(&config.bedrock).context("Failed to create Bedrock client")?;
    if !client.has_api_key() {
        warn!(
            "No Bedrock API key found in ${}; model calls will fail",
            config.bedrock.api_key_env
        );
    }

    Ok(ChatEngine::new(store, Arc::new(client), config))
}

/// Answer one text message and print the JSON response
#[inline]
pub async fn chat(message: &str) -> Result<()> {
    let config = load_config()?;
    let engine = build_engine(&config).await?;

    let response = engine.chat(message).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// MIME type implied by an image file's extension
#[inline]
pub fn guess_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime_type = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(mime_type)
}

/// Identify and describe the vehicle in an image file
#[inline]
pub async fn chat_image(path: &Path, mime_type: Option<String>) -> Result<()> {
    let mime_type = match mime_type {
        Some(mime_type) => mime_type,
        None => guess_mime_type(path)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Cannot infer image type of {}; pass --mime-type", path.display()))?,
    };
    if ImageFormat::from_mime_type(&mime_type).is_none() {
        warn!("Unsupported MIME type {}, the vision model will be skipped", mime_type);
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;

    let config = load_config()?;
    let engine = build_engine(&config).await?;

    let response = engine.chat_with_image(&bytes, &mime_type).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Append one document to the knowledge store
#[inline]
pub async fn add_knowledge(content: &str, source: &str) -> Result<()> {
    let config = load_config()?;
    let engine = build_engine(&config).await?;

    let response = engine.add_knowledge(content, source).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Rebuild the knowledge store from a JSON vehicle catalog
#[inline]
pub async fn ingest(path: &Path) -> Result<()> {
    let records = load_records(path)?;
    info!("Loaded {} vehicle records from {}", records.len(), path.display());

    let documents: Vec<_> = records.iter().map(|record| record.to_document()).collect();

    let config = load_config()?;
    let store = open_store(&config).await?;

    let progress = ProgressBar::new(documents.len() as u64).with_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding vehicles {wide_bar}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let count = store
        .rebuild_with_progress(&documents, |n| progress.inc(n as u64))
        .await
        .context("Failed to rebuild knowledge store")?;
    progress.finish_and_clear();

    println!(
        "✅ Rebuilt knowledge store at {} with {} documents",
        config.knowledge_path().display(),
        count
    );
    Ok(())
}

/// Show configuration, embedding provider health and document count
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config()?;

    println!("📋 Configuration");
    for line in describe_config(&config) {
        println!("   {}", line);
    }
    println!();

    println!("🔌 Embedding Provider");
    match config.embedding.provider {
        EmbeddingProviderKind::Ollama => {
            let embedder = OllamaEmbedder::new(&config.embedding.ollama)?;
            match tokio::task::spawn_blocking(move || embedder.health_check()).await? {
                Ok(()) => println!(
                    "   ✅ Ollama reachable with model {}",
                    config.embedding.ollama.model
                ),
                Err(e) => {
                    error!("Ollama health check failed: {:#}", e);
                    println!("   ❌ Ollama unavailable: {:#}", e);
                    println!("   Use 'carchat config' to update connection settings.");
                    return Ok(());
                }
            }
        }
        EmbeddingProviderKind::Bedrock => {
            let client = BedrockClient::new(&config.bedrock)?;
            if client.has_api_key() {
                println!("   ✅ Bedrock API key present (${})", config.bedrock.api_key_env);
            } else {
                println!("   ❌ Bedrock API key missing (${})", config.bedrock.api_key_env);
                return Ok(());
            }
        }
    }
    println!();

    println!("📚 Knowledge Store");
    match open_store(&config).await {
        Ok(store) => println!("   Documents: {}", store.document_count().await?),
        Err(e) => println!("   ❌ {:#}", e),
    }

    Ok(())
}

/// Serve the chat tools over MCP stdio
#[inline]
pub async fn serve_mcp() -> Result<()> {
    let config = load_config()?;
    let engine = Arc::new(build_engine(&config).await?);

    let server = Arc::new(McpServer::new(
        "carchat".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    register_chat_tools(&server, &engine).await;

    // stdout carries protocol traffic
    eprintln!("✅ MCP server initialized with tools: chat, chat_with_image, add_knowledge");
    eprintln!("🌐 Listening on stdio transport. Press Ctrl+C to stop.");

    server.serve_stdio().await
}
