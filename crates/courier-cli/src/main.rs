use anyhow::Result;
use clap::{Parser, Subcommand};
use courier_infrastructure::ConfigService;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier - Agent Client Protocol agent over stdio", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve ACP on stdin/stdout
    Acp {
        /// Directory for per-session update logs
        #[arg(long)]
        sessions_dir: Option<PathBuf>,

        /// Directory for conversation records
        #[arg(long)]
        conversations_dir: Option<PathBuf>,

        /// Do not record session updates for replay
        #[arg(long, default_value_t = false)]
        no_persist: bool,
    },
    /// Inspect stored session updates
    Updates {
        #[command(subcommand)]
        action: UpdatesAction,
    },
}

#[derive(Subcommand)]
enum UpdatesAction {
    /// Print a session's stored updates as JSON lines
    Show { session_id: String },
    /// Delete a session's update log
    Delete { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let service = ConfigService::load(cli.config.as_deref())?;
    let log_guard = logging::init(&service.config().logging, cli.log_level.as_deref())?;
    if let Some(source) = service.source() {
        tracing::debug!("Loaded config from {}", source.display());
    }

    match cli.command {
        Commands::Acp {
            sessions_dir,
            conversations_dir,
            no_persist,
        } => {
            let mut config = service.into_config();
            if sessions_dir.is_some() {
                config.storage.sessions_dir = sessions_dir;
            }
            if conversations_dir.is_some() {
                config.storage.conversations_dir = conversations_dir;
            }
            if no_persist {
                config.storage.persist_updates = false;
            }
            let exit = commands::acp::run(ConfigService::from_config(config)).await?;
            if exit == commands::acp::Exit::Interrupted {
                // The runtime would wait on the blocked stdin reader; flush logs and leave.
                drop(log_guard);
                std::process::exit(0);
            }
        }
        Commands::Updates { action } => match action {
            UpdatesAction::Show { session_id } => commands::updates::show(&service, &session_id).await?,
            UpdatesAction::Delete { session_id } => commands::updates::delete(&service, &session_id).await?,
        },
    }

    Ok(())
}
