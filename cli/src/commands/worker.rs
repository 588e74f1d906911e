// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Long-running worker: task consumers plus the periodic management loop.
//!
//! The loop is the producer for this process's queue: every period it
//! enqueues a `manage_memory` task that one of the consumers picks up.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tiermem_cortex::domain::config::TierMemConfig;

use crate::runtime::Runtime;

pub async fn run(config: TierMemConfig) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let shutdown = CancellationToken::new();

    let consumers = runtime
        .queue
        .start(runtime.dispatcher.clone(), shutdown.clone());
    let management = runtime.management_loop();
    let management_shutdown = management.shutdown_token();
    let management_handle = management.start();

    info!(
        consumers = consumers.len(),
        period_secs = runtime.config.spec.memory.management_period.as_secs(),
        "tiermem worker started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping worker");

    shutdown.cancel();
    management_shutdown.cancel();
    for consumer in consumers {
        if let Err(e) = consumer.await {
            warn!(error = %e, "Task consumer exited abnormally");
        }
    }
    if let Err(e) = management_handle.await {
        warn!(error = %e, "Management loop exited abnormally");
    }

    let pending = runtime.queue.pending();
    if pending > 0 {
        warn!(pending, "Worker stopped with tasks still queued");
    }
    info!("tiermem worker stopped");
    Ok(())
}
