// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Message intake commands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use tiermem_cortex::domain::config::TierMemConfig;
use tiermem_cortex::RelatedContext;

use crate::runtime::Runtime;

#[derive(Subcommand)]
pub enum MessageCommand {
    /// Classify a message and store it as memory
    Add {
        /// External id of the chat
        external_id: String,

        /// Message text
        text: String,

        /// Conversation context as `user=text`, repeatable
        #[arg(long = "context", value_name = "USER=TEXT")]
        context: Vec<String>,
    },
}

pub async fn handle_command(command: MessageCommand, config: TierMemConfig) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    match command {
        MessageCommand::Add {
            external_id,
            text,
            context,
        } => {
            let related_context = context
                .iter()
                .map(|entry| parse_context(entry))
                .collect::<Result<Vec<_>>>()?;
            let message_id = runtime
                .messages
                .add_message(&external_id, &text, related_context)
                .await?;

            // No worker in this process: run the classification inline.
            let completed = runtime.queue.drain(runtime.dispatcher.as_ref()).await;
            if completed == 0 {
                anyhow::bail!("Message {} could not be classified, see logs", message_id);
            }
            println!("{}", format!("✓ Message processed: {}", message_id).green());
        }
    }
    Ok(())
}

fn parse_context(entry: &str) -> Result<RelatedContext> {
    let (user, text) = entry
        .split_once('=')
        .with_context(|| format!("Invalid context {:?}, expected USER=TEXT", entry))?;
    Ok(RelatedContext::new(text, user))
}
