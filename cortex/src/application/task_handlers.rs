// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Routes queued tasks to the use case that handles their kind.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::application::classification::ClassificationPipeline;
use crate::application::orchestrator::ManagementOrchestrator;
use crate::domain::error::MemoryError;
use crate::domain::task::{LabeledMessage, NewMessage, Task, TaskHandler, TaskKind};

pub struct MemoryTaskDispatcher {
    pipeline: Arc<ClassificationPipeline>,
    orchestrator: Arc<ManagementOrchestrator>,
}

impl MemoryTaskDispatcher {
    pub fn new(pipeline: Arc<ClassificationPipeline>, orchestrator: Arc<ManagementOrchestrator>) -> Self {
        Self { pipeline, orchestrator }
    }
}

#[async_trait]
impl TaskHandler for MemoryTaskDispatcher {
    async fn handle(&self, task: &Task) -> Result<(), MemoryError> {
        match task.kind {
            TaskKind::ClassifyMessage => {
                let message: NewMessage = task.decode()?;
                let outcome = self.pipeline.classify(message).await?;
                debug!(task_id = %task.id, ?outcome, "Message classified");
            }
            TaskKind::StoreShortTerm => {
                let labeled: LabeledMessage = task.decode()?;
                self.pipeline.store_short_term(&labeled).await?;
            }
            TaskKind::StoreLongTerm => {
                let labeled: LabeledMessage = task.decode()?;
                self.pipeline.store_long_term(&labeled).await?;
            }
            TaskKind::ManageMemory => {
                // Per-chat failures are reported in the outcome, not retried here.
                self.orchestrator.run_cycle().await?;
            }
        }
        Ok(())
    }
}
