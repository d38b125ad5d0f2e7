use anyhow::Result;
use clap::{Parser, Subcommand};
use pitwall::commands::{ingest, serve, show_config, status};
use pitwall::config::Config;

#[derive(Parser)]
#[command(name = "pitwall")]
#[command(about = "A retrieval-augmented Formula One chat assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, chunk, and embed the source pages into the vector collection
    Ingest {
        /// Source page URLs; defaults to the configured list when omitted
        urls: Vec<String>,
    },
    /// Start the chat API server
    Serve,
    /// Show collection health and record counts
    Status,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Ingest { urls } => {
            ingest(config, urls).await?;
        }
        Commands::Serve => {
            serve(config).await?;
        }
        Commands::Status => {
            status(config).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}
