// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for chats and both memory tiers, following the DDD
//! Repository pattern: interfaces live in the domain layer and are
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ChatRepository` | `Chat` | `InMemoryChatRepository`, `PostgresChatRepository` |
//! | `ShortTermMemoryRepository` | `ShortTermMemory` | `InMemoryShortTermRepository`, `PostgresShortTermRepository` |
//! | `LongTermMemoryRepository` | `LongTermMemory` | `InMemoryLongTermRepository`, `PostgresLongTermRepository` |
//!
//! ## Unit of Work
//!
//! Multi-step writes (one tier-management pass for one chat) run inside a
//! [`Transaction`] obtained from a [`UnitOfWork`]. The transaction hands out
//! a [`Repositories`] bundle bound to it; everything written through that
//! bundle commits or rolls back together. Dropping a transaction without
//! committing rolls it back, so a cancelled task never leaves half a pass
//! behind.
//!
//! ## Scoring
//!
//! `get_scored` is a provided method: backends only load active records by
//! id, and scoring always happens in [`crate::domain::scoring`] against the
//! loaded batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::chat::{Chat, ChatId};
use super::error::MemoryError;
use super::memory::{
    LongTermMemory, MemoryId, MemoryPage, NewLongTermMemory, NewShortTermMemory,
    RelatedContext, ScoredMemory, ShortTermMemory,
};
use super::scoring;

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Register a chat. Fails with `AlreadyExists` when the external id is taken.
    async fn create(&self, external_id: &str) -> Result<Chat, RepositoryError>;

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<ChatId>, RepositoryError>;

    async fn get_all(&self) -> Result<Vec<Chat>, RepositoryError>;
}

#[async_trait]
pub trait ShortTermMemoryRepository: Send + Sync {
    /// Insert the record, or return the stored one when `memory.id` already
    /// exists (replayed tasks).
    async fn create(&self, memory: NewShortTermMemory) -> Result<ShortTermMemory, RepositoryError>;

    async fn get_by_id(&self, chat_id: ChatId, id: MemoryId) -> Result<Option<ShortTermMemory>, RepositoryError>;

    async fn get_by_chat_id(
        &self,
        chat_id: ChatId,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<ShortTermMemory>, RepositoryError>;

    /// Active records of the chat among `ids`. Unknown ids are skipped.
    async fn get_active_by_ids(&self, chat_id: ChatId, ids: &[MemoryId]) -> Result<Vec<ShortTermMemory>, RepositoryError>;

    /// Load and score `ids` against each other.
    async fn get_scored(&self, chat_id: ChatId, ids: &[MemoryId]) -> Result<Vec<ScoredMemory>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let memories = self.get_active_by_ids(chat_id, ids).await?;
        Ok(scoring::score_short_term(&memories, Utc::now()))
    }

    async fn register_usage(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError>;

    async fn deactivate(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError>;

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), RepositoryError>;

    /// Replace the text with the newer one, append `related_context` and
    /// bump `merge_count`. Merging the same `message_id` twice leaves the
    /// record unchanged and returns it as stored.
    async fn merge(
        &self,
        chat_id: ChatId,
        id: MemoryId,
        message_id: Uuid,
        text: String,
        related_context: Vec<RelatedContext>,
    ) -> Result<ShortTermMemory, RepositoryError>;

    /// Active records created strictly before `created_before` whose
    /// `access_count + merge_count` is strictly below `min_relevance`.
    async fn get_eligible_for_deactivation(
        &self,
        chat_id: ChatId,
        created_before: DateTime<Utc>,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError>;

    /// Active records whose `access_count + merge_count >= min_relevance`.
    async fn get_eligible_for_promotion(
        &self,
        chat_id: ChatId,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError>;
}

#[async_trait]
pub trait LongTermMemoryRepository: Send + Sync {
    /// Insert the record, or return the stored one when `memory.id` already exists.
    async fn create(&self, memory: NewLongTermMemory) -> Result<LongTermMemory, RepositoryError>;

    async fn get_by_id(&self, chat_id: ChatId, id: MemoryId) -> Result<Option<LongTermMemory>, RepositoryError>;

    async fn get_by_chat_id(
        &self,
        chat_id: ChatId,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<LongTermMemory>, RepositoryError>;

    async fn get_active_by_ids(&self, chat_id: ChatId, ids: &[MemoryId]) -> Result<Vec<LongTermMemory>, RepositoryError>;

    async fn get_scored(&self, chat_id: ChatId, ids: &[MemoryId]) -> Result<Vec<ScoredMemory>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let memories = self.get_active_by_ids(chat_id, ids).await?;
        Ok(scoring::score_long_term(&memories, Utc::now()))
    }

    async fn register_usage(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError>;

    async fn deactivate(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError>;

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), RepositoryError>;
}

/// Repositories bound to one connection scope (shared pool or one transaction).
#[derive(Clone)]
pub struct Repositories {
    pub chats: Arc<dyn ChatRepository>,
    pub short_term: Arc<dyn ShortTermMemoryRepository>,
    pub long_term: Arc<dyn LongTermMemoryRepository>,
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError>;
}

#[async_trait]
pub trait Transaction: Send + Sync {
    /// Repositories whose writes belong to this transaction.
    fn repositories(&self) -> Repositories;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Run `work` inside one transaction: commit on `Ok`, roll back on `Err`.
pub async fn in_transaction<T, F, Fut>(uow: &dyn UnitOfWork, work: F) -> Result<T, MemoryError>
where
    F: FnOnce(Repositories) -> Fut + Send,
    Fut: Future<Output = Result<T, MemoryError>> + Send,
    T: Send,
{
    let tx = uow.begin().await?;
    match work(tx.repositories()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back transaction");
            }
            Err(err)
        }
    }
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction already finished")]
    TransactionClosed,

    /// A record written by the transaction changed underneath it.
    #[error("Write conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::AlreadyExists(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
