// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory inspection commands

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use tiermem_cortex::application::FetchRequest;
use tiermem_cortex::domain::config::TierMemConfig;

use crate::runtime::Runtime;

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Retrieve the memories most relevant to a query
    Fetch {
        external_id: String,
        query: String,

        #[arg(long, default_value_t = 2)]
        limit: usize,

        #[arg(long, default_value_t = 10)]
        vector_search_limit: usize,

        #[arg(long, default_value_t = 0.6)]
        threshold: f32,

        #[arg(long, default_value_t = 0.8)]
        long_term_threshold: f32,
    },

    /// List active short-term memories
    ShortTerm {
        external_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// List active long-term memories
    LongTerm {
        external_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Deactivate every memory of a chat
    Reset { external_id: String },
}

pub async fn handle_command(command: MemoryCommand, config: TierMemConfig) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let memories = &runtime.memories;

    match command {
        MemoryCommand::Fetch {
            external_id,
            query,
            limit,
            vector_search_limit,
            threshold,
            long_term_threshold,
        } => {
            let request = FetchRequest {
                query,
                limit,
                vector_search_limit,
                vector_search_threshold: threshold,
                long_term_threshold,
            };
            let fetched = memories.fetch(&external_id, &request).await?;
            if fetched.is_empty() {
                println!("{}", "No relevant memories".dimmed());
            }
            for memory in fetched {
                println!("  {:.3}  [{}]  {}", memory.score, memory.memory_type, memory.text);
            }
        }
        MemoryCommand::ShortTerm {
            external_id,
            limit,
            offset,
        } => {
            let page = memories.short_term_page(&external_id, limit, offset).await?;
            println!("{}", format!("{} short-term memories", page.total).bold());
            for memory in page.memories {
                println!(
                    "  {}  access {}  merges {}  {}",
                    memory.created_at.format("%Y-%m-%d %H:%M"),
                    memory.access_count,
                    memory.merge_count,
                    memory.text
                );
            }
        }
        MemoryCommand::LongTerm {
            external_id,
            limit,
            offset,
        } => {
            let page = memories.long_term_page(&external_id, limit, offset).await?;
            println!("{}", format!("{} long-term memories", page.total).bold());
            for memory in page.memories {
                println!(
                    "  {}  access {}  {}",
                    memory.created_at.format("%Y-%m-%d %H:%M"),
                    memory.access_count,
                    memory.text
                );
            }
        }
        MemoryCommand::Reset { external_id } => {
            memories.reset_chat(&external_id).await?;
            println!("{}", format!("✓ Memories of {} reset", external_id).green());
        }
    }
    Ok(())
}
