// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Vector Store Contract
//!
//! Every memory record owns one embedding point. The point id is the id of
//! the memory it was created for and never changes; `payload.memory_id`
//! follows the record through promotion (see [`VectorStore::retarget`]).
//!
//! Implementations must only return points whose payload is `active` and
//! whose `chat_id` matches the query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::chat::ChatId;
use super::memory::{MemoryId, MemoryType};

/// Payload stored next to each embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPayload {
    pub chat_id: ChatId,
    pub memory_type: MemoryType,
    pub memory_id: MemoryId,
    pub active: bool,
}

/// Search hit with its cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredVectorPoint {
    pub point_id: MemoryId,
    pub score: f32,
    pub payload: MemoryPayload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert the point for `memory_id`. Creating the same point twice
    /// overwrites it, so retries never produce duplicates.
    async fn create(
        &self,
        chat_id: ChatId,
        vector: Vec<f32>,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError>;

    /// Up to `limit` active points of the chat with similarity `>= threshold`,
    /// best first.
    async fn search(
        &self,
        chat_id: ChatId,
        vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredVectorPoint>, VectorStoreError>;

    /// Mark the point currently owned by `memory_id` inactive.
    async fn deactivate(&self, chat_id: ChatId, memory_id: MemoryId) -> Result<(), VectorStoreError>;

    /// Mark every point of the chat inactive.
    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), VectorStoreError>;

    /// Hand the point created for `point_id` over to another record.
    /// Used by promotion; applying it twice is harmless.
    async fn retarget(
        &self,
        chat_id: ChatId,
        point_id: MemoryId,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Vector store backend error: {0}")]
    Backend(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Malformed point payload: {0}")]
    Payload(String),
}
