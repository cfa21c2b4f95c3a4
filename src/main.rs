use std::path::PathBuf;

use clap::{Parser, Subcommand};

use rag_agent::config::Config;
use rag_agent::ingest::IngestPipeline;
use rag_agent::openai::OpenAiClient;
use rag_agent::pinecone::PineconeClient;
use rag_agent::rag::RagEngine;
use rag_agent::{RagError, Result, agent, server};

#[derive(Parser)]
#[command(name = "rag-agent")]
#[command(about = "Retrieval-augmented QA over PDF documents with a LiveKit token service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a directory of PDFs into the vector index
    Ingest {
        /// Directory containing the PDF files
        dir: PathBuf,
    },
    /// Ask a single question against the indexed documents
    Ask {
        /// The question to answer
        question: String,
    },
    /// Run an interactive agent session on stdin/stdout
    Agent,
    /// Start the LiveKit token-issuance HTTP API
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Check service connectivity and print index statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().map_err(|e| RagError::Config(e.to_string()))?;

    match cli.command {
        Commands::Ingest { dir } => {
            let stats = tokio::task::spawn_blocking(move || IngestPipeline::new(&config).run(&dir))
                .await
                .map_err(|e| RagError::Other(anyhow::anyhow!("Ingestion task failed: {e}")))??;
            println!(
                "Ingested {} documents ({} pages, {} chunks, {} vectors upserted)",
                stats.documents, stats.pages, stats.chunks, stats.upserted
            );
            println!(
                "Index vector count: {} -> {}",
                stats.vectors_before, stats.vectors_after
            );
        }
        Commands::Ask { question } => {
            let answer =
                tokio::task::spawn_blocking(move || RagEngine::new(&config)?.answer(&question))
                    .await
                    .map_err(|e| RagError::Other(anyhow::anyhow!("Query task failed: {e}")))??;
            println!("{answer}");
        }
        Commands::Agent => {
            config
                .require_livekit()
                .map_err(|e| RagError::Config(e.to_string()))?;
            tokio::task::spawn_blocking(move || {
                let session = agent::AgentSession::new(&config)?;
                let stdin = std::io::stdin();
                session.run(stdin.lock(), std::io::stdout())
            })
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("Agent task failed: {e}")))??;
        }
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            server::serve(&config).await?;
        }
        Commands::Status => {
            show_status(config).await?;
        }
    }

    Ok(())
}

async fn show_status(config: Config) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let models = OpenAiClient::new(&config.openai).list_models()?;
        println!("OpenAI: reachable ({} models visible)", models.len());

        let pinecone = PineconeClient::new(&config.pinecone);
        let handle = pinecone.open_index(&config.pinecone)?;
        let stats = handle.stats()?;
        println!(
            "Pinecone index {}: dimension {}, {} vectors total",
            config.pinecone.index_name, stats.dimension, stats.total_vector_count
        );
        for (namespace, ns_stats) in &stats.namespaces {
            println!("  namespace {namespace}: {} vectors", ns_stats.vector_count);
        }
        Ok(())
    })
    .await
    .map_err(|e| RagError::Other(anyhow::anyhow!("Status task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["rag-agent", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_command_takes_directory() {
        let cli = Cli::try_parse_from(["rag-agent", "ingest", "./docs"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { dir } = parsed.command {
                assert_eq!(dir, PathBuf::from("./docs"));
            }
        }
    }

    #[test]
    fn ask_command_takes_question() {
        let cli = Cli::try_parse_from(["rag-agent", "ask", "What is backpropagation?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { question } = parsed.command {
                assert_eq!(question, "What is backpropagation?");
            }
        }
    }

    #[test]
    fn serve_command_with_port() {
        let cli = Cli::try_parse_from(["rag-agent", "serve", "--port", "9000"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Serve { port } = parsed.command {
                assert_eq!(port, Some(9000));
            }
        }
    }

    #[test]
    fn ingest_requires_directory() {
        let cli = Cli::try_parse_from(["rag-agent", "ingest"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["rag-agent", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
