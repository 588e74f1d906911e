// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Engine Error Taxonomy
//!
//! Every use case returns [`MemoryError`]. Backend-specific failures
//! ([`RepositoryError`], [`VectorStoreError`], [`InferenceError`]) convert
//! into it with `?`.
//!
//! The task queue consults [`MemoryError::is_retryable`] to decide between
//! another attempt and a permanent failure.

use super::inference::InferenceError;
use super::repository::RepositoryError;
use super::vector::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(#[source] InferenceError),

    #[error("Repository error: {0}")]
    Repository(#[source] RepositoryError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Unexpected classification label: {0}")]
    UnexpectedClassification(i64),

    #[error("Invalid task payload: {0}")]
    InvalidPayload(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task queue is closed")]
    QueueClosed,
}

impl MemoryError {
    /// Whether the task queue should attempt the invocation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            MemoryError::InferenceUnavailable(_)
            | MemoryError::Repository(_)
            | MemoryError::VectorStore(_)
            | MemoryError::Timeout(_) => true,
            MemoryError::NotFound(_)
            | MemoryError::AlreadyExists(_)
            | MemoryError::UnexpectedClassification(_)
            | MemoryError::InvalidPayload(_)
            | MemoryError::QueueClosed => false,
        }
    }

    /// Short stable name used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::NotFound(_) => "not_found",
            MemoryError::AlreadyExists(_) => "already_exists",
            MemoryError::InferenceUnavailable(_) => "inference_unavailable",
            MemoryError::Repository(_) => "repository",
            MemoryError::VectorStore(_) => "vector_store",
            MemoryError::UnexpectedClassification(_) => "unexpected_classification",
            MemoryError::InvalidPayload(_) => "invalid_payload",
            MemoryError::Timeout(_) => "timeout",
            MemoryError::QueueClosed => "queue_closed",
        }
    }
}

impl From<RepositoryError> for MemoryError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => MemoryError::NotFound(what),
            RepositoryError::AlreadyExists(what) => MemoryError::AlreadyExists(what),
            other => MemoryError::Repository(other),
        }
    }
}

impl From<InferenceError> for MemoryError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::UnexpectedLabel(label) => MemoryError::UnexpectedClassification(label),
            other => MemoryError::InferenceUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(MemoryError::from(RepositoryError::Database("down".into())).is_retryable());
        assert!(MemoryError::from(InferenceError::Network("refused".into())).is_retryable());
        assert!(MemoryError::from(VectorStoreError::Backend("503".into())).is_retryable());
        assert!(MemoryError::Timeout(std::time::Duration::from_secs(1)).is_retryable());

        assert!(!MemoryError::from(RepositoryError::NotFound("chat".into())).is_retryable());
        assert!(!MemoryError::from(RepositoryError::AlreadyExists("chat".into())).is_retryable());
        assert!(!MemoryError::from(InferenceError::UnexpectedLabel(9)).is_retryable());
        assert!(!MemoryError::InvalidPayload("garbage".into()).is_retryable());
    }

    #[test]
    fn test_repository_not_found_maps_to_domain_not_found() {
        let err: MemoryError = RepositoryError::NotFound("memory 42".into()).into();
        assert!(matches!(err, MemoryError::NotFound(ref what) if what == "memory 42"));
        assert_eq!(err.kind(), "not_found");
    }
}
