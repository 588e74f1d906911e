// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # In-Process Task Queue
//!
//! At-least-once delivery over an unbounded `async_channel`, consumed by a
//! fixed number of tokio tasks. Each attempt runs under the configured
//! timeout; retryable failures are attempted again with exponential backoff
//! until `max_retry` is spent, after which the task is logged as a dead
//! letter and counted in `tiermem_tasks_failed_total`.

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::config::WorkerConfig;
use crate::domain::error::MemoryError;
use crate::domain::task::{Task, TaskHandler, TaskQueue};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct LocalTaskQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    config: WorkerConfig,
}

impl LocalTaskQueue {
    pub fn new(config: WorkerConfig) -> Self {
        let (sender, receiver) = async_channel::unbounded();
        Self {
            sender,
            receiver,
            config,
        }
    }

    /// Tasks waiting for a consumer.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Spawn `worker.concurrency` consumers. They stop once `shutdown` fires;
    /// a task already running is allowed to finish its current attempt.
    pub fn start(
        self: &Arc<Self>,
        handler: Arc<dyn TaskHandler>,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        info!(concurrency = self.config.concurrency, "Starting task consumers");

        (0..self.config.concurrency)
            .map(|consumer| {
                let queue = Arc::clone(self);
                let handler = Arc::clone(&handler);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        let task = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            received = queue.receiver.recv() => match received {
                                Ok(task) => task,
                                Err(_) => break,
                            },
                        };
                        // Outcome is already logged and counted.
                        let _ = queue.execute(handler.as_ref(), &task).await;
                    }
                    debug!(consumer, "Task consumer stopped");
                })
            })
            .collect()
    }

    /// Execute every queued task on the calling task until the queue is
    /// empty. Returns how many tasks completed successfully.
    pub async fn drain(&self, handler: &dyn TaskHandler) -> usize {
        let mut completed = 0;
        while let Ok(task) = self.receiver.try_recv() {
            if self.execute(handler, &task).await.is_ok() {
                completed += 1;
            }
        }
        completed
    }

    /// Run one task to completion: retries, timeout and dead-lettering.
    pub async fn execute(&self, handler: &dyn TaskHandler, task: &Task) -> Result<(), MemoryError> {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.config.timeout, handler.handle(task)).await {
                Ok(result) => result,
                Err(_) => Err(MemoryError::Timeout(self.config.timeout)),
            };

            match result {
                Ok(()) => {
                    debug!(task_id = %task.id, kind = %task.kind, attempt, "Task completed");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retry => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        task_id = %task.id,
                        kind = %task.kind,
                        attempt,
                        max_retry = self.config.max_retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Task failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        task_id = %task.id,
                        kind = %task.kind,
                        attempts = attempt + 1,
                        error_kind = e.kind(),
                        error = %e,
                        payload = %task.payload,
                        "Task dead-lettered"
                    );
                    metrics::counter!("tiermem_tasks_failed_total", "kind" => task.kind.as_str()).increment(1);
                    return Err(e);
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config.retry_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), MemoryError> {
        debug!(task_id = %task.id, kind = %task.kind, "Enqueueing task");
        self.sender.send(task).await.map_err(|_| MemoryError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inference::InferenceError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        calls: AtomicU32,
        failures_before_success: u32,
        retryable: bool,
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        async fn handle(&self, _task: &Task) -> Result<(), MemoryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                if self.retryable {
                    return Err(InferenceError::Network("connection refused".into()).into());
                }
                return Err(MemoryError::InvalidPayload("bad".into()));
            }
            Ok(())
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl TaskHandler for SlowHandler {
        async fn handle(&self, _task: &Task) -> Result<(), MemoryError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    }

    fn config(max_retry: u32) -> WorkerConfig {
        WorkerConfig {
            max_retry,
            timeout: Duration::from_millis(100),
            concurrency: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried() {
        let queue = LocalTaskQueue::new(config(3));
        let handler = FlakyHandler {
            calls: AtomicU32::new(0),
            failures_before_success: 2,
            retryable: true,
        };

        queue.execute(&handler, &Task::manage_memory()).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let queue = LocalTaskQueue::new(config(2));
        let handler = FlakyHandler {
            calls: AtomicU32::new(0),
            failures_before_success: 10,
            retryable: true,
        };

        let err = queue.execute(&handler, &Task::manage_memory()).await.unwrap_err();
        assert!(matches!(err, MemoryError::InferenceUnavailable(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let queue = LocalTaskQueue::new(config(5));
        let handler = FlakyHandler {
            calls: AtomicU32::new(0),
            failures_before_success: 10,
            retryable: false,
        };

        let err = queue.execute(&handler, &Task::manage_memory()).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidPayload(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_times_out() {
        let queue = LocalTaskQueue::new(config(0));
        let err = queue.execute(&SlowHandler, &Task::manage_memory()).await.unwrap_err();
        assert!(matches!(err, MemoryError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_drain_runs_queued_tasks_inline() {
        let queue = LocalTaskQueue::new(config(0));
        let handler = FlakyHandler {
            calls: AtomicU32::new(0),
            failures_before_success: 1,
            retryable: false,
        };
        for _ in 0..3 {
            queue.enqueue(Task::manage_memory()).await.unwrap();
        }

        assert_eq!(queue.drain(&handler).await, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_consumers_drain_the_queue() {
        let queue = Arc::new(LocalTaskQueue::new(config(0)));
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            failures_before_success: 0,
            retryable: true,
        });
        let shutdown = CancellationToken::new();

        for _ in 0..5 {
            queue.enqueue(Task::manage_memory()).await.unwrap();
        }
        let consumers = queue.start(handler.clone(), shutdown.clone());

        for _ in 0..100 {
            if handler.calls.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        for consumer in consumers {
            consumer.await.unwrap();
        }

        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);
        assert_eq!(queue.pending(), 0);
    }
}
