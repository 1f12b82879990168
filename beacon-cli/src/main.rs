//! Beacon: command-line front end for beacon-social.
//!
//! `beacon serve` runs a log server; `beacon chat` logs an identity into a
//! log and relays stdin lines as messages.

mod chat;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use beacon_social::{LogServer, LogServerConfig};

#[derive(Parser)]
#[command(name = "beacon", about = "Presence and messaging over a shared log")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a WebSocket log server.
    Serve {
        /// Address to bind to.
        #[arg(long, env = "BEACON_BIND", default_value = "127.0.0.1:9191")]
        bind: String,
        /// Journal file; omit for an in-memory log.
        #[arg(long)]
        storage: Option<PathBuf>,
    },
    /// Log in and chat from stdin.
    Chat {
        /// Log URL (`ws://host:port` or `file:///path`).
        #[arg(long, env = "BEACON_LOG_URL")]
        log_url: String,
        /// Agent filter selecting the log partition.
        #[arg(long, env = "BEACON_AGENT", default_value = "lobby")]
        agent: String,
        /// Local identity; generated when omitted.
        #[arg(long, env = "BEACON_IDENTITY")]
        identity: Option<String>,
        /// Seconds between polls.
        #[arg(long, default_value_t = 10)]
        poll_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, storage } => {
            info!("Starting log server...");
            let config = LogServerConfig {
                bind_addr: bind,
                storage_path: storage,
            };
            let server = LogServer::open(config).await?;
            server
                .run()
                .await
                .map_err(|e| anyhow::anyhow!("log server stopped: {e}"))?;
        }
        Commands::Chat {
            log_url,
            agent,
            identity,
            poll_secs,
        } => {
            chat::run(chat::ChatOptions {
                log_url,
                agent,
                identity,
                poll_secs,
            })
            .await?;
        }
    }

    Ok(())
}
