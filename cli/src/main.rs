// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # tiermem CLI
//!
//! The `tiermem` binary hosts the memory engine.
//!
//! ## Commands
//!
//! - `tiermem worker` - Run task consumers and the management loop until Ctrl-C
//! - `tiermem manage` - Run one memory management cycle now
//! - `tiermem chat create|list` - Chat registration
//! - `tiermem message add` - Classify and store one message
//! - `tiermem memory fetch|short-term|long-term|reset` - Inspect a chat's memories
//! - `tiermem config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::info;

use tiermem_cli::commands::{self, ChatCommand, ConfigCommand, MemoryCommand, MessageCommand};
use tiermem_cortex::domain::config::{LogFormat, TierMemConfig};

/// tiermem - Tiered memory for conversational agents
#[derive(Parser)]
#[command(name = "tiermem")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TIERMEM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "TIERMEM_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume tasks and run memory management until interrupted
    #[command(name = "worker")]
    Worker,

    /// Run a single memory management cycle
    #[command(name = "manage")]
    Manage,

    /// Chat registration
    #[command(name = "chat")]
    Chat {
        #[command(subcommand)]
        command: ChatCommand,
    },

    /// Message intake
    #[command(name = "message")]
    Message {
        #[command(subcommand)]
        command: MessageCommand,
    },

    /// Memory inspection
    #[command(name = "memory")]
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Config subcommands load (and report on) the file themselves.
    if let Commands::Config { command } = cli.command {
        init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Text)?;
        return commands::config::handle_command(command, cli.config).await;
    }

    let config = TierMemConfig::load_or_default(cli.config).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let observability = &config.spec.observability;
    init_logging(
        cli.log_level.as_deref().unwrap_or(&observability.log_level),
        observability.log_format,
    )?;
    if let Some(port) = observability.metrics_port {
        init_metrics(port)?;
    }

    match cli.command {
        Commands::Worker => commands::worker::run(config).await,
        Commands::Manage => commands::manage::run(config).await,
        Commands::Chat { command } => commands::chat::handle_command(command, config).await,
        Commands::Message { command } => commands::message::handle_command(command, config).await,
        Commands::Memory { command } => commands::memory::handle_command(command, config).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

fn init_metrics(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(port, "Prometheus metrics exporter listening");
    Ok(())
}
