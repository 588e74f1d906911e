// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Retrieval Engine
//!
//! Vector search narrows a chat's memories to candidates; each tier is then
//! scored within its own batch and the merged list is ranked. Only the
//! memories actually returned have their usage registered.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Read path feeding memories back into a conversation

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::chat::ChatId;
use crate::domain::error::MemoryError;
use crate::domain::inference::InferenceGateway;
use crate::domain::memory::{MemoryId, MemoryType, ScoredMemory};
use crate::domain::repository::Repositories;
use crate::domain::scoring;
use crate::domain::vector::VectorStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub query: String,

    /// Memories returned after ranking
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Candidates pulled from the vector store
    #[serde(default = "default_vector_search_limit")]
    pub vector_search_limit: usize,

    #[serde(default = "default_vector_search_threshold")]
    pub vector_search_threshold: f32,

    /// Minimum similarity for a long-term candidate
    #[serde(default = "default_long_term_threshold")]
    pub long_term_threshold: f32,
}

fn default_limit() -> usize {
    2
}

fn default_vector_search_limit() -> usize {
    10
}

fn default_vector_search_threshold() -> f32 {
    0.6
}

fn default_long_term_threshold() -> f32 {
    0.8
}

impl FetchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_limit(),
            vector_search_limit: default_vector_search_limit(),
            vector_search_threshold: default_vector_search_threshold(),
            long_term_threshold: default_long_term_threshold(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

pub struct RetrievalEngine {
    inference: Arc<dyn InferenceGateway>,
    repositories: Repositories,
    vectors: Arc<dyn VectorStore>,
}

impl RetrievalEngine {
    pub fn new(
        inference: Arc<dyn InferenceGateway>,
        repositories: Repositories,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            inference,
            repositories,
            vectors,
        }
    }

    pub async fn fetch(&self, chat_id: ChatId, request: &FetchRequest) -> Result<Vec<ScoredMemory>, MemoryError> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.inference.embed(&request.query).await?;
        let hits = self
            .vectors
            .search(
                chat_id,
                &embedding,
                request.vector_search_limit,
                request.vector_search_threshold,
            )
            .await?;

        let mut short_term_ids: Vec<MemoryId> = Vec::new();
        let mut long_term_ids: Vec<MemoryId> = Vec::new();
        for hit in hits {
            match hit.payload.memory_type {
                MemoryType::ShortTerm => short_term_ids.push(hit.payload.memory_id),
                MemoryType::LongTerm if hit.score >= request.long_term_threshold => {
                    long_term_ids.push(hit.payload.memory_id)
                }
                MemoryType::LongTerm => {}
            }
        }

        let mut scored = self.repositories.short_term.get_scored(chat_id, &short_term_ids).await?;
        scored.extend(self.repositories.long_term.get_scored(chat_id, &long_term_ids).await?);
        let ranked = scoring::rank(scored, request.limit);

        for memory in &ranked {
            match memory.memory_type {
                MemoryType::ShortTerm => self.repositories.short_term.register_usage(chat_id, memory.id).await?,
                MemoryType::LongTerm => self.repositories.long_term.register_usage(chat_id, memory.id).await?,
            }
        }

        debug!(
            chat_id = %chat_id,
            short_term_candidates = short_term_ids.len(),
            long_term_candidates = long_term_ids.len(),
            returned = ranked.len(),
            "Fetched memories"
        );
        Ok(ranked)
    }
}
