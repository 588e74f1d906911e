// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Chat registration commands

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use tiermem_cortex::domain::config::TierMemConfig;

use crate::runtime::Runtime;

#[derive(Subcommand)]
pub enum ChatCommand {
    /// Register a chat under an external id
    Create {
        /// Id of the chat in the calling system
        external_id: String,
    },

    /// List registered chats
    List,
}

pub async fn handle_command(command: ChatCommand, config: TierMemConfig) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    match command {
        ChatCommand::Create { external_id } => {
            let chat = runtime.chats.create_chat(&external_id).await?;
            println!("{}", format!("✓ Chat created: {} ({})", chat.external_id, chat.id).green());
        }
        ChatCommand::List => {
            let chats = runtime.chats.list_chats().await?;
            if chats.is_empty() {
                println!("{}", "No chats registered".dimmed());
            }
            for chat in chats {
                println!("  {}  {}", chat.external_id.bold(), chat.id);
            }
        }
    }
    Ok(())
}
