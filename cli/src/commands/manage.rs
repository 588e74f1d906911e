// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot memory management cycle

use anyhow::Result;
use colored::Colorize;

use tiermem_cortex::domain::config::TierMemConfig;

use crate::runtime::Runtime;

pub async fn run(config: TierMemConfig) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let report = runtime.orchestrator.run_cycle().await?;

    for outcome in &report.outcomes {
        let status = if outcome.success { "ok".green() } else { "failed".red() };
        println!(
            "  {} {}  promoted {}  discarded {}",
            status, outcome.external_id, outcome.promoted, outcome.discarded
        );
        if let Some(error) = &outcome.error {
            println!("      {}", error.dimmed());
        }
    }
    println!(
        "{}",
        format!(
            "Managed {} chats: {} promoted, {} discarded, {} failed",
            report.outcomes.len(),
            report.promoted,
            report.discarded,
            report.failed
        )
        .bold()
    );

    if report.failed > 0 {
        anyhow::bail!("{} chats failed memory management", report.failed);
    }
    Ok(())
}
