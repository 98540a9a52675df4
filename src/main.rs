use std::path::PathBuf;

use clap::{Parser, Subcommand};
use carchat::Result;
use carchat::commands::{add_knowledge, chat, chat_image, ingest, serve_mcp, show_status};
use carchat::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "carchat")]
#[command(about = "Car-shopping RAG assistant with an MCP server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Bedrock, embeddings and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ask a question answered from the knowledge store
    Chat {
        message: String,
    },
    /// Identify the vehicle in an image and describe it
    ChatImage {
        /// Path to the image file
        path: PathBuf,
        /// MIME type, inferred from the file extension when omitted
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Append one document to the knowledge store
    AddKnowledge {
        #[arg(long)]
        content: String,
        /// Source identifier, e.g. car-<origin-id>
        #[arg(long)]
        source: String,
    },
    /// Rebuild the knowledge store from a JSON vehicle catalog
    Ingest {
        file: PathBuf,
    },
    /// Start MCP server on stdio
    Serve,
    /// Show configuration, provider health and document count
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Chat { message } => {
            chat(&message).await?;
        }
        Commands::ChatImage { path, mime_type } => {
            chat_image(&path, mime_type).await?;
        }
        Commands::AddKnowledge { content, source } => {
            add_knowledge(&content, &source).await?;
        }
        Commands::Ingest { file } => {
            ingest(&file).await?;
        }
        Commands::Serve => {
            serve_mcp().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn chat_command() {
        let cli = Cli::try_parse_from(["carchat", "chat", "쏘나타 가격 알려줘"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat { message } = parsed.command {
                assert_eq!(message, "쏘나타 가격 알려줘");
            }
        }
    }

    #[test]
    fn chat_image_with_mime_type() {
        let cli = Cli::try_parse_from([
            "carchat",
            "chat-image",
            "car.bin",
            "--mime-type",
            "image/png",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::ChatImage { path, mime_type } = parsed.command {
                assert_eq!(path, PathBuf::from("car.bin"));
                assert_eq!(mime_type.as_deref(), Some("image/png"));
            }
        }
    }

    #[test]
    fn add_knowledge_requires_source() {
        let cli = Cli::try_parse_from(["carchat", "add-knowledge", "--content", "신차"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn ingest_command() {
        let cli = Cli::try_parse_from(["carchat", "ingest", "catalog.json"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Ingest { .. }));
        }
    }

    #[test]
    fn serve_command() {
        let cli = Cli::try_parse_from(["carchat", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Serve));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["carchat", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["carchat", "add"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
