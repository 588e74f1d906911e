// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory Enhancement
//!
//! Rewrites a chat message into a standalone statement before it is stored,
//! then re-embeds the rewrite. Enhancement is best effort: on any failure
//! [`MemoryEnhancer::enhance`] returns `None` and the caller keeps the
//! original text.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Optional step of the classification pipeline

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::inference::{CompletionProvider, InferenceGateway};
use crate::domain::memory::RelatedContext;

/// `user` recorded on the context entry that keeps the pre-rewrite text.
pub const ORIGINAL_MESSAGE_USER: &str = "original_message";

const ENHANCEMENT_PROMPT: &str = "Rewrite the following chat message as a short, self-contained \
statement about the user that still makes sense without the conversation around it. \
Keep every fact, add nothing, and answer with the statement only.\n\nMessage: ";

#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedMessage {
    pub text: String,
    pub embedding: Vec<f32>,
    /// Extra context to attach to the memory.
    pub related_context: Vec<RelatedContext>,
}

pub struct MemoryEnhancer {
    completion: Arc<dyn CompletionProvider>,
    inference: Arc<dyn InferenceGateway>,
}

impl MemoryEnhancer {
    pub fn new(completion: Arc<dyn CompletionProvider>, inference: Arc<dyn InferenceGateway>) -> Self {
        Self { completion, inference }
    }

    pub async fn enhance(&self, text: &str) -> Option<EnhancedMessage> {
        let prompt = format!("{}{}", ENHANCEMENT_PROMPT, text);
        let rewritten = match self.completion.complete(&prompt).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
            Ok(_) => {
                warn!("Memory enhancement returned an empty completion, keeping original text");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Memory enhancement failed, keeping original text");
                return None;
            }
        };

        let embedding = match self.inference.embed(&rewritten).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Embedding the enhanced memory failed, keeping original text");
                return None;
            }
        };

        debug!(original = text, enhanced = %rewritten, "Memory enhancement completed");
        Some(EnhancedMessage {
            text: rewritten,
            embedding,
            related_context: vec![RelatedContext::new(text, ORIGINAL_MESSAGE_USER)],
        })
    }
}
