// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tier Scheduler
//!
//! Moves short-term memories out of their tier: stale and unused ones are
//! evicted, frequently used ones are promoted to long-term. Each pass runs in
//! its own transaction and updates the matching vector points before commit,
//! so a failed pass leaves records and points as they were for the next
//! cycle to retry.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Per-chat memory lifecycle, driven by the management orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::chat::{Chat, ChatId};
use crate::domain::config::MemoryManagementConfig;
use crate::domain::error::MemoryError;
use crate::domain::memory::{MemoryType, NewLongTermMemory};
use crate::domain::repository::{in_transaction, UnitOfWork};
use crate::domain::vector::VectorStore;

/// Result of managing one chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatManagementOutcome {
    pub chat_id: ChatId,
    pub external_id: String,
    /// Both passes committed.
    pub success: bool,
    pub promoted: usize,
    pub discarded: usize,
    pub error: Option<String>,
}

pub struct TierScheduler {
    uow: Arc<dyn UnitOfWork>,
    vectors: Arc<dyn VectorStore>,
    config: MemoryManagementConfig,
}

impl TierScheduler {
    pub fn new(uow: Arc<dyn UnitOfWork>, vectors: Arc<dyn VectorStore>, config: MemoryManagementConfig) -> Self {
        Self { uow, vectors, config }
    }

    /// Eviction then promotion. The second pass runs even when the first fails.
    pub async fn manage_chat(&self, chat: &Chat) -> ChatManagementOutcome {
        let mut errors = Vec::new();

        let discarded = match self.evict(chat.id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "Eviction pass failed");
                errors.push(format!("eviction: {}", e));
                0
            }
        };

        let promoted = match self.promote(chat.id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "Promotion pass failed");
                errors.push(format!("promotion: {}", e));
                0
            }
        };

        ChatManagementOutcome {
            chat_id: chat.id,
            external_id: chat.external_id.clone(),
            success: errors.is_empty(),
            promoted,
            discarded,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        }
    }

    pub async fn evict(&self, chat_id: ChatId) -> Result<usize, MemoryError> {
        self.evict_created_before(chat_id, Utc::now() - self.config.age_limit())
            .await
    }

    /// Deactivate active short-term memories created strictly before
    /// `cutoff` with relevance strictly below the discard threshold.
    pub async fn evict_created_before(&self, chat_id: ChatId, cutoff: DateTime<Utc>) -> Result<usize, MemoryError> {
        let vectors = Arc::clone(&self.vectors);
        let min_relevance = self.config.minimal_relevancy_for_discard;

        let evicted = in_transaction(self.uow.as_ref(), move |repos| async move {
            let eligible = repos
                .short_term
                .get_eligible_for_deactivation(chat_id, cutoff, min_relevance)
                .await?;
            for memory in &eligible {
                repos.short_term.deactivate(chat_id, memory.id).await?;
                vectors.deactivate(chat_id, memory.id).await?;
            }
            Ok::<_, MemoryError>(eligible.len())
        })
        .await?;

        if evicted > 0 {
            metrics::counter!("tiermem_memories_evicted_total").increment(evicted as u64);
            info!(chat_id = %chat_id, evicted, "Evicted short-term memories");
        } else {
            debug!(chat_id = %chat_id, "No short-term memories to evict");
        }
        Ok(evicted)
    }

    /// Copy frequently used short-term memories into the long-term tier and
    /// hand their vector points over to the copies.
    pub async fn promote(&self, chat_id: ChatId) -> Result<usize, MemoryError> {
        let vectors = Arc::clone(&self.vectors);
        let min_relevance = self.config.minimal_relevancy_for_promotion;

        let promoted = in_transaction(self.uow.as_ref(), move |repos| async move {
            let eligible = repos
                .short_term
                .get_eligible_for_promotion(chat_id, min_relevance)
                .await?;
            for memory in &eligible {
                let long_term = repos
                    .long_term
                    .create(NewLongTermMemory::promoted_from(memory))
                    .await?;
                repos.short_term.deactivate(chat_id, memory.id).await?;
                // The point keeps the id of the short-term memory it was created for.
                vectors
                    .retarget(chat_id, memory.id, MemoryType::LongTerm, long_term.id)
                    .await?;
                debug!(chat_id = %chat_id, from = %memory.id, to = %long_term.id, "Promoted memory");
            }
            Ok::<_, MemoryError>(eligible.len())
        })
        .await?;

        if promoted > 0 {
            metrics::counter!("tiermem_memories_promoted_total").increment(promoted as u64);
            info!(chat_id = %chat_id, promoted, "Promoted short-term memories");
        }
        Ok(promoted)
    }
}
