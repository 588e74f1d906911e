// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use tiermem_cortex::domain::config::TierMemConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default configuration as a starting point
    Generate {
        /// Output path (default: ./tiermem-config.yaml)
        #[arg(short, long, default_value = "./tiermem-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = TierMemConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. TIERMEM_CONFIG_PATH: {}",
            std::env::var("TIERMEM_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./tiermem-config.yaml");
        println!("  4. ~/.tiermem/config.yaml");
        println!("  5. /etc/tiermem/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let spec = &config.spec;
    println!("{}", "Memory Management:".bold());
    println!("  Similarity threshold: {}", spec.memory.similarity_threshold);
    println!("  Short-term age limit: {}h", spec.memory.age_limit_hours);
    println!(
        "  Relevancy for promotion / discard: {} / {}",
        spec.memory.minimal_relevancy_for_promotion, spec.memory.minimal_relevancy_for_discard
    );
    println!("  Workers per cycle: {}", spec.memory.max_simultaneous_tasks);
    println!(
        "  Period: {}",
        seconds(spec.memory.management_period)
    );
    println!();

    println!("{}", "Backends:".bold());
    println!("  Storage: {:?}", spec.storage.backend);
    println!(
        "  Vector store: {:?} (collection {}, size {})",
        spec.vector_store.backend, spec.vector_store.collection, spec.vector_store.vector_size
    );
    println!("  Inference: {}", spec.inference.endpoint);
    match &spec.enhancement {
        Some(enhancement) => println!("  Enhancement: {} at {}", enhancement.model, enhancement.endpoint),
        None => println!("  Enhancement: {}", "(disabled)".dimmed()),
    }
    println!();

    println!("{}", "Worker:".bold());
    println!("  Concurrency: {}", spec.worker.concurrency);
    println!("  Max retry: {}", spec.worker.max_retry);
    println!("  Timeout: {}", seconds(spec.worker.timeout));
    println!();

    Ok(())
}

fn seconds(duration: std::time::Duration) -> String {
    format!("{}s", duration.as_secs_f64())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = TierMemConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    let sample = TierMemConfig::default().to_yaml_string()?;

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
