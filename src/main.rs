//! colloquy - conversational agent in the terminal
//!
//! Usage:
//!   colloquy chat                          -> chat with the configured model
//!   colloquy chat --mock                   -> offline chat against an echo model
//!   colloquy chat --conversation support-1 -> name the conversation
//!   colloquy config                        -> print the effective configuration

mod chat;

use clap::{Parser, Subcommand};
use colloquy_core::CoreConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "colloquy",
    about = "Conversational agent with bounded memory and tool use",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file (TOML)
    #[arg(short, long, global = true, default_value = "colloquy.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent in the terminal
    Chat {
        /// Conversation id (default: auto-generated)
        #[arg(long)]
        conversation: Option<String>,
        /// Project the system directive is looked up for
        #[arg(long, default_value = "default")]
        project: String,
        /// Account the system directive is looked up for
        #[arg(long, default_value = "local")]
        account: String,
        /// Use the offline echo model instead of a real provider
        #[arg(long, default_value_t = false)]
        mock: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = CoreConfig::load(&cli.config);

    match cli.command {
        Commands::Chat { conversation, project, account, mock } => {
            let options = chat::ChatOptions { conversation, project, account, mock };
            chat::run(config, options).await?;
        }
        Commands::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "colloquy=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
