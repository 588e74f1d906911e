// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inference
//!
//! Anti-corruption layer over the classification / embedding service and the
//! optional text-completion model used for memory enhancement.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Contracts implemented in `infrastructure::inference`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::memory::Label;

/// Classifier verdict for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    /// Present when the caller asked for it.
    pub embedding: Option<Vec<f32>>,
}

#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Classify `text`, optionally returning its embedding in the same call.
    async fn predict(&self, text: &str, with_embedding: bool) -> Result<Prediction, InferenceError>;

    /// Embed `text` without classifying it.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

/// Free-form completion used to rewrite messages into standalone memories.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;

    /// Check the provider is reachable
    async fn health_check(&self) -> Result<(), InferenceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Inference service error: {0}")]
    Service(String),

    #[error("Malformed response: {0}")]
    Response(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Unexpected label: {0}")]
    UnexpectedLabel(i64),
}
