// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Vector store implementations: in-memory cosine search for development
//! and tests, Qdrant for production.

pub mod qdrant;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::chat::ChatId;
use crate::domain::memory::{MemoryId, MemoryType};
use crate::domain::vector::{MemoryPayload, ScoredVectorPoint, VectorStore, VectorStoreError};

pub use qdrant::QdrantVectorStore;

struct StoredPoint {
    vector: Vec<f32>,
    payload: MemoryPayload,
}

/// Brute-force cosine similarity over a map of points.
#[derive(Default)]
pub struct InMemoryVectorStore {
    points: RwLock<HashMap<MemoryId, StoredPoint>>,
    dimension: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject vectors whose length differs from `dimension`.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            points: RwLock::default(),
            dimension: Some(dimension),
        }
    }

    /// Payload of a point, whatever its state.
    pub fn payload(&self, point_id: MemoryId) -> Option<MemoryPayload> {
        self.points.read().get(&point_id).map(|p| p.payload.clone())
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create(
        &self,
        chat_id: ChatId,
        vector: Vec<f32>,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError> {
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(VectorStoreError::Dimension {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let point = StoredPoint {
            vector,
            payload: MemoryPayload {
                chat_id,
                memory_type,
                memory_id,
                active: true,
            },
        };
        self.points.write().insert(memory_id, point);
        Ok(())
    }

    async fn search(
        &self,
        chat_id: ChatId,
        vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredVectorPoint>, VectorStoreError> {
        let points = self.points.read();
        let mut hits: Vec<ScoredVectorPoint> = points
            .iter()
            .filter(|(_, p)| p.payload.chat_id == chat_id && p.payload.active)
            .map(|(id, p)| ScoredVectorPoint {
                point_id: *id,
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.point_id.cmp(&b.point_id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn deactivate(&self, chat_id: ChatId, memory_id: MemoryId) -> Result<(), VectorStoreError> {
        let mut points = self.points.write();
        for point in points
            .values_mut()
            .filter(|p| p.payload.chat_id == chat_id && p.payload.memory_id == memory_id)
        {
            point.payload.active = false;
        }
        Ok(())
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), VectorStoreError> {
        let mut points = self.points.write();
        for point in points.values_mut().filter(|p| p.payload.chat_id == chat_id) {
            point.payload.active = false;
        }
        Ok(())
    }

    async fn retarget(
        &self,
        chat_id: ChatId,
        point_id: MemoryId,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError> {
        let mut points = self.points.write();
        if let Some(point) = points.get_mut(&point_id).filter(|p| p.payload.chat_id == chat_id) {
            point.payload.memory_type = memory_type;
            point.payload.memory_id = memory_id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_is_scoped_to_chat_and_active_points() {
        let store = InMemoryVectorStore::new();
        let chat = ChatId::new();
        let other_chat = ChatId::new();
        let kept = MemoryId::new();
        let retired = MemoryId::new();

        store.create(chat, vec![1.0, 0.0], MemoryType::ShortTerm, kept).await.unwrap();
        store.create(chat, vec![1.0, 0.1], MemoryType::ShortTerm, retired).await.unwrap();
        store.create(other_chat, vec![1.0, 0.0], MemoryType::LongTerm, MemoryId::new()).await.unwrap();
        store.deactivate(chat, retired).await.unwrap();

        let hits = store.search(chat, &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.memory_id, kept);
    }

    #[tokio::test]
    async fn test_search_applies_threshold_order_and_limit() {
        let store = InMemoryVectorStore::new();
        let chat = ChatId::new();
        let exact = MemoryId::new();
        let close = MemoryId::new();

        store.create(chat, vec![1.0, 0.0], MemoryType::ShortTerm, exact).await.unwrap();
        store.create(chat, vec![0.9, 0.3], MemoryType::LongTerm, close).await.unwrap();
        store.create(chat, vec![0.0, 1.0], MemoryType::ShortTerm, MemoryId::new()).await.unwrap();

        let hits = store.search(chat, &[1.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.point_id).collect::<Vec<_>>(), vec![exact, close]);

        let hits = store.search(chat, &[1.0, 0.0], 1, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].point_id, exact);
    }

    #[tokio::test]
    async fn test_create_is_an_upsert() {
        let store = InMemoryVectorStore::new();
        let chat = ChatId::new();
        let memory = MemoryId::new();

        store.create(chat, vec![1.0, 0.0], MemoryType::ShortTerm, memory).await.unwrap();
        store.create(chat, vec![1.0, 0.0], MemoryType::ShortTerm, memory).await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_retarget_hands_point_to_new_record() {
        let store = InMemoryVectorStore::new();
        let chat = ChatId::new();
        let short_term = MemoryId::new();
        let long_term = MemoryId::new();

        store.create(chat, vec![0.2, 0.8], MemoryType::ShortTerm, short_term).await.unwrap();
        store.retarget(chat, short_term, MemoryType::LongTerm, long_term).await.unwrap();
        store.retarget(chat, short_term, MemoryType::LongTerm, long_term).await.unwrap();

        let payload = store.payload(short_term).unwrap();
        assert_eq!(payload.memory_type, MemoryType::LongTerm);
        assert_eq!(payload.memory_id, long_term);

        // Addressed by its new owner from now on.
        store.deactivate(chat, long_term).await.unwrap();
        assert!(!store.payload(short_term).unwrap().active);
    }

    #[tokio::test]
    async fn test_dimension_is_enforced() {
        let store = InMemoryVectorStore::with_dimension(3);
        let err = store
            .create(ChatId::new(), vec![1.0], MemoryType::ShortTerm, MemoryId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Dimension { expected: 3, actual: 1 }));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
