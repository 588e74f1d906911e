// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory Management Orchestrator
//!
//! One management cycle fans every chat out to a fixed pool of workers,
//! each running the [`TierScheduler`] for the chats it pulls from a shared
//! queue. A single aggregator collects the per-chat outcomes while the
//! workers run; the cycle returns once every worker has finished and the
//! outcome stream is drained.
//!
//! [`ManagementLoop`] schedules a cycle on a fixed period by enqueueing a
//! `manage_memory` task, so each cycle runs on a task consumer under the
//! queue's timeout and retry budget. Cycles never overlap: one that starts
//! while another is still running is skipped.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Background tier management across all chats

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::tier_scheduler::{ChatManagementOutcome, TierScheduler};
use crate::domain::error::MemoryError;
use crate::domain::repository::ChatRepository;
use crate::domain::task::{Task, TaskQueue};

/// Outcomes of one management cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagementReport {
    pub outcomes: Vec<ChatManagementOutcome>,
    pub promoted: usize,
    pub discarded: usize,
    pub failed: usize,
}

impl ManagementReport {
    fn record(&mut self, outcome: ChatManagementOutcome) {
        self.promoted += outcome.promoted;
        self.discarded += outcome.discarded;
        if !outcome.success {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }
}

pub struct ManagementOrchestrator {
    chats: Arc<dyn ChatRepository>,
    scheduler: Arc<TierScheduler>,
    max_workers: usize,
    running: Mutex<()>,
}

impl ManagementOrchestrator {
    pub fn new(chats: Arc<dyn ChatRepository>, scheduler: Arc<TierScheduler>, max_workers: usize) -> Self {
        Self {
            chats,
            scheduler,
            max_workers: max_workers.max(1),
            running: Mutex::new(()),
        }
    }

    pub async fn run_cycle(&self) -> Result<ManagementReport, MemoryError> {
        let Ok(_running) = self.running.try_lock() else {
            info!("Memory management cycle already running, skipping");
            return Ok(ManagementReport::default());
        };

        let started = Instant::now();
        let chats = self.chats.get_all().await?;
        if chats.is_empty() {
            debug!("No chats to manage");
            return Ok(ManagementReport::default());
        }

        let workers = self.max_workers.min(chats.len());
        let (work_tx, work_rx) = async_channel::bounded(chats.len());
        let (result_tx, result_rx) = async_channel::unbounded::<ChatManagementOutcome>();

        let aggregator = tokio::spawn(async move {
            let mut report = ManagementReport::default();
            while let Ok(outcome) = result_rx.recv().await {
                report.record(outcome);
            }
            report
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let scheduler = Arc::clone(&self.scheduler);
                tokio::spawn(async move {
                    while let Ok(chat) = work_rx.recv().await {
                        let outcome = scheduler.manage_chat(&chat).await;
                        if result_tx.send(outcome).await.is_err() {
                            break;
                        }
                    }
                    debug!(worker, "Management worker finished");
                })
            })
            .collect();
        drop(work_rx);
        drop(result_tx);

        for chat in chats {
            // Capacity covers every chat; this only fails if all workers died.
            if work_tx.send(chat).await.is_err() {
                break;
            }
        }
        work_tx.close();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Management worker panicked");
            }
        }

        let report = aggregator.await.unwrap_or_else(|e| {
            error!(error = %e, "Management aggregator panicked");
            ManagementReport::default()
        });

        metrics::histogram!("tiermem_management_cycle_seconds").record(started.elapsed().as_secs_f64());
        info!(
            chats = report.outcomes.len(),
            promoted = report.promoted,
            discarded = report.discarded,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Memory management cycle completed"
        );
        Ok(report)
    }
}

/// Enqueues a `manage_memory` task every `period` until shut down.
pub struct ManagementLoop {
    queue: Arc<dyn TaskQueue>,
    period: Duration,
    shutdown_token: CancellationToken,
}

impl ManagementLoop {
    pub fn new(queue: Arc<dyn TaskQueue>, period: Duration) -> Self {
        Self {
            queue,
            period,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(period_ms = self.period.as_millis() as u64, "Starting memory management loop");

        let mut tick = interval(self.period);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.queue.enqueue(Task::manage_memory()).await {
                        warn!(error = %e, "Failed to schedule memory management cycle");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping memory management loop");
                    break;
                }
            }
        }

        info!("Memory management loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{MemoryManagementConfig, WorkerConfig};
    use crate::domain::vector::VectorStore;
    use crate::infrastructure::{InMemoryDatabase, InMemoryVectorStore, LocalTaskQueue};

    fn orchestrator() -> ManagementOrchestrator {
        let db = InMemoryDatabase::new();
        let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let scheduler = Arc::new(TierScheduler::new(
            db.unit_of_work(),
            vectors,
            MemoryManagementConfig::default(),
        ));
        ManagementOrchestrator::new(db.repositories().chats, scheduler, 2)
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let orchestrator = orchestrator();
        let _running = orchestrator.running.lock().await;

        let report = orchestrator.run_cycle().await.unwrap();

        assert_eq!(report, ManagementReport::default());
    }

    #[tokio::test]
    async fn test_loop_enqueues_manage_tasks_until_cancelled() {
        let queue = Arc::new(LocalTaskQueue::new(WorkerConfig::default()));
        let management = Arc::new(ManagementLoop::new(queue.clone(), Duration::from_millis(10)));
        let shutdown = management.shutdown_token();
        let handle = management.start();

        for _ in 0..100 {
            if queue.pending() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("management loop did not stop")
            .unwrap();

        assert!(queue.pending() >= 2);
    }
}
