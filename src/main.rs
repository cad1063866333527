use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use profile_intake::{
    config::Config,
    error::ExportError,
    export::{ConversationExporter, ExportFormat},
    logger::ConversationLogger,
    storage::SqliteStorage,
};

/// Export surface over the conversation log
#[derive(Parser)]
#[command(name = "profile-intake", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all known session identifiers
    List,

    /// Export one session's conversation log
    Export {
        /// Session identifier to export
        session_id: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = ExportFormat::Structured)]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let exporter = ConversationExporter::new(ConversationLogger::new(storage));

    match cli.command {
        Commands::List => {
            let sessions = match exporter.list().await {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Failed to list sessions: {}", e);
                    std::process::exit(1);
                }
            };

            if sessions.is_empty() {
                println!("No sessions found.");
            } else {
                println!("Available sessions:");
                for session_id in sessions {
                    println!("  - {}", session_id);
                }
            }
        }
        Commands::Export {
            session_id,
            format,
            output,
        } => {
            // Render fully before touching the output target so a failed
            // export never leaves a partial file.
            let rendered = match exporter.export(&session_id, format).await {
                Ok(r) => r,
                Err(e @ ExportError::NotFound { .. }) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Export failed: {}", e);
                    std::process::exit(1);
                }
            };

            match output {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, &rendered) {
                        eprintln!("Failed to write {}: {}", path.display(), e);
                        std::process::exit(1);
                    }
                    info!(
                        session_id = %session_id,
                        format = %format,
                        path = %path.display(),
                        "Session exported"
                    );
                }
                None => println!("{}", rendered),
            }
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        profile_intake::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        profile_intake::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
