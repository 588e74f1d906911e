// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Classification Pipeline
//!
//! Decides what an inbound message becomes:
//!
//! 1. predict the label, with the embedding unless an enhancer will
//!    produce one;
//! 2. `NoMemory` stops here;
//! 3. optionally rewrite the message (see [`MemoryEnhancer`]);
//! 4. look for a near-duplicate in the same chat; a short-term message
//!    merges into a short-term neighbour, anything else with a neighbour is
//!    dropped;
//! 5. otherwise store the record in its tier and create its vector point.
//!
//! The memory id is derived from `(chat_id, message_id)`, record creation is
//! create-if-absent and vector creation is an upsert, so a replayed task
//! finishes an interrupted store instead of duplicating it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::enhancement::MemoryEnhancer;
use crate::domain::error::MemoryError;
use crate::domain::inference::InferenceGateway;
use crate::domain::memory::{Label, MemoryId, MemoryType, NewLongTermMemory, NewShortTermMemory};
use crate::domain::repository::Repositories;
use crate::domain::task::{LabeledMessage, NewMessage};
use crate::domain::vector::{ScoredVectorPoint, VectorStore};

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    /// Labelled `NoMemory`; nothing written.
    Discarded,
    /// Folded into an existing short-term memory.
    Merged { into: MemoryId },
    /// A near-duplicate already exists; nothing written.
    Duplicate { of: MemoryId },
    Stored { memory_id: MemoryId, memory_type: MemoryType },
}

pub struct ClassificationPipeline {
    inference: Arc<dyn InferenceGateway>,
    enhancer: Option<MemoryEnhancer>,
    repositories: Repositories,
    vectors: Arc<dyn VectorStore>,
    similarity_threshold: f32,
}

impl ClassificationPipeline {
    pub fn new(
        inference: Arc<dyn InferenceGateway>,
        repositories: Repositories,
        vectors: Arc<dyn VectorStore>,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            inference,
            enhancer: None,
            repositories,
            vectors,
            similarity_threshold,
        }
    }

    pub fn with_enhancer(mut self, enhancer: MemoryEnhancer) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub async fn classify(&self, message: NewMessage) -> Result<ClassificationOutcome, MemoryError> {
        let prediction = self
            .inference
            .predict(&message.text, self.enhancer.is_none())
            .await?;
        metrics::counter!("tiermem_messages_classified_total", "label" => prediction.label.as_str()).increment(1);

        let memory_type = match prediction.label {
            Label::NoMemory => {
                debug!(chat_id = %message.chat_id, message_id = %message.message_id, "Message carries no memory");
                return Ok(ClassificationOutcome::Discarded);
            }
            Label::ShortTerm => MemoryType::ShortTerm,
            Label::LongTerm => MemoryType::LongTerm,
        };

        let mut message = message;
        let enhanced = match &self.enhancer {
            Some(enhancer) => enhancer.enhance(&message.text).await,
            None => None,
        };
        let embedding = match (enhanced, prediction.embedding) {
            (Some(enhanced), _) => {
                message.text = enhanced.text;
                message.related_context.extend(enhanced.related_context);
                enhanced.embedding
            }
            (None, Some(embedding)) => embedding,
            // Enhancement fell back to the original text, which was never embedded.
            (None, None) => self.inference.embed(&message.text).await?,
        };

        if let Some(neighbour) = self.find_duplicate(&message, &embedding).await? {
            let existing = neighbour.payload.memory_id;
            if memory_type == MemoryType::ShortTerm && neighbour.payload.memory_type == MemoryType::ShortTerm {
                self.repositories
                    .short_term
                    .merge(
                        message.chat_id,
                        existing,
                        message.message_id,
                        message.text,
                        message.related_context,
                    )
                    .await?;
                metrics::counter!("tiermem_memories_merged_total").increment(1);
                info!(chat_id = %message.chat_id, memory_id = %existing, "Merged message into similar memory");
                return Ok(ClassificationOutcome::Merged { into: existing });
            }

            info!(
                chat_id = %message.chat_id,
                memory_id = %existing,
                label = prediction.label.as_str(),
                "Similar memory already exists, dropping message"
            );
            return Ok(ClassificationOutcome::Duplicate { of: existing });
        }

        let labeled = LabeledMessage {
            message,
            label: prediction.label,
            embedding,
        };
        let memory_id = match memory_type {
            MemoryType::ShortTerm => self.store_short_term(&labeled).await?,
            MemoryType::LongTerm => self.store_long_term(&labeled).await?,
        };

        info!(chat_id = %labeled.message.chat_id, memory_id = %memory_id, memory_type = %memory_type, "Stored memory");
        Ok(ClassificationOutcome::Stored { memory_id, memory_type })
    }

    /// Nearest neighbour above the similarity threshold, ignoring the point
    /// an earlier attempt of this same message already wrote.
    async fn find_duplicate(
        &self,
        message: &NewMessage,
        embedding: &[f32],
    ) -> Result<Option<ScoredVectorPoint>, MemoryError> {
        let own_id = message.memory_id();
        let hits = self
            .vectors
            .search(message.chat_id, embedding, 1, self.similarity_threshold)
            .await?;

        Ok(hits
            .into_iter()
            .next()
            .filter(|hit| hit.point_id != own_id && hit.payload.memory_id != own_id))
    }

    pub async fn store_short_term(&self, labeled: &LabeledMessage) -> Result<MemoryId, MemoryError> {
        let message = &labeled.message;
        let memory_id = message.memory_id();

        let stored = self
            .repositories
            .short_term
            .create(NewShortTermMemory {
                id: memory_id,
                chat_id: message.chat_id,
                text: message.text.clone(),
                created_at: Utc::now(),
                related_context: message.related_context.clone(),
            })
            .await?;

        // Already retired or promoted by the time this replay arrived.
        if !stored.active {
            return Ok(memory_id);
        }

        self.vectors
            .create(message.chat_id, labeled.embedding.clone(), MemoryType::ShortTerm, memory_id)
            .await?;
        Ok(memory_id)
    }

    pub async fn store_long_term(&self, labeled: &LabeledMessage) -> Result<MemoryId, MemoryError> {
        let message = &labeled.message;
        let memory_id = message.memory_id();

        let stored = self
            .repositories
            .long_term
            .create(NewLongTermMemory {
                id: memory_id,
                chat_id: message.chat_id,
                text: message.text.clone(),
                access_count: 0,
                created_at: Utc::now(),
                related_context: message.related_context.clone(),
            })
            .await?;

        if !stored.active {
            return Ok(memory_id);
        }

        self.vectors
            .create(message.chat_id, labeled.embedding.clone(), MemoryType::LongTerm, memory_id)
            .await?;
        Ok(memory_id)
    }
}
