// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Qdrant production implementation of the memory vector store.
//!
//! One collection holds the points of every chat. Points are keyed by the
//! memory id they were created for; `chat_id`, `memory_type`, `memory_id`
//! and `active` live in the payload and drive every filter.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** `VectorStore` over Qdrant gRPC

use anyhow::Context as _;
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, Condition, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct,
        SearchPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder, Value,
        VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::domain::chat::ChatId;
use crate::domain::memory::{MemoryId, MemoryType};
use crate::domain::vector::{MemoryPayload, ScoredVectorPoint, VectorStore, VectorStoreError};

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    vector_size: u64,
}

impl QdrantVectorStore {
    pub fn new(url: &str, collection: impl Into<String>, vector_size: u64) -> anyhow::Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .context("Failed to create Qdrant client")?;

        Ok(Self {
            client,
            collection: collection.into(),
            vector_size,
        })
    }

    /// Create the collection with cosine distance when it does not exist yet.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .context("Failed to check collection existence")?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine)),
                )
                .await
                .context("Failed to create Qdrant collection")?;
            debug!(collection = %self.collection, "Created Qdrant collection");
        }
        Ok(())
    }

    fn to_payload(payload: &MemoryPayload) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("chat_id".to_string(), payload.chat_id.to_string().into());
        map.insert("memory_type".to_string(), payload.memory_type.code().into());
        map.insert("memory_id".to_string(), payload.memory_id.to_string().into());
        map.insert("active".to_string(), payload.active.into());
        map
    }

    fn from_payload(payload: &HashMap<String, Value>) -> Result<MemoryPayload, VectorStoreError> {
        let memory_type = MemoryType::from_code(integer_field(payload, "memory_type")?)
            .ok_or_else(|| VectorStoreError::Payload("unknown memory_type".to_string()))?;

        Ok(MemoryPayload {
            chat_id: ChatId(uuid_field(payload, "chat_id")?),
            memory_type,
            memory_id: MemoryId(uuid_field(payload, "memory_id")?),
            active: bool_field(payload, "active")?,
        })
    }

    fn chat_filter(chat_id: ChatId) -> Condition {
        Condition::matches("chat_id", chat_id.to_string())
    }
}

fn field<'a>(payload: &'a HashMap<String, Value>, key: &str) -> Result<&'a Kind, VectorStoreError> {
    payload
        .get(key)
        .and_then(|value| value.kind.as_ref())
        .ok_or_else(|| VectorStoreError::Payload(format!("missing field: {}", key)))
}

fn uuid_field(payload: &HashMap<String, Value>, key: &str) -> Result<Uuid, VectorStoreError> {
    match field(payload, key)? {
        Kind::StringValue(s) => Uuid::parse_str(s).map_err(|e| VectorStoreError::Payload(format!("{}: {}", key, e))),
        _ => Err(VectorStoreError::Payload(format!("invalid type for field: {}", key))),
    }
}

fn integer_field(payload: &HashMap<String, Value>, key: &str) -> Result<i64, VectorStoreError> {
    match field(payload, key)? {
        Kind::IntegerValue(i) => Ok(*i),
        _ => Err(VectorStoreError::Payload(format!("invalid type for field: {}", key))),
    }
}

fn bool_field(payload: &HashMap<String, Value>, key: &str) -> Result<bool, VectorStoreError> {
    match field(payload, key)? {
        Kind::BoolValue(b) => Ok(*b),
        _ => Err(VectorStoreError::Payload(format!("invalid type for field: {}", key))),
    }
}

fn backend(e: qdrant_client::QdrantError) -> VectorStoreError {
    VectorStoreError::Backend(e.to_string())
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create(
        &self,
        chat_id: ChatId,
        vector: Vec<f32>,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError> {
        if vector.len() != self.vector_size as usize {
            return Err(VectorStoreError::Dimension {
                expected: self.vector_size as usize,
                actual: vector.len(),
            });
        }

        let payload = Self::to_payload(&MemoryPayload {
            chat_id,
            memory_type,
            memory_id,
            active: true,
        });
        let point = PointStruct::new(memory_id.to_string(), vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn search(
        &self,
        chat_id: ChatId,
        vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredVectorPoint>, VectorStoreError> {
        let filter = Filter::must([Self::chat_filter(chat_id), Condition::matches("active", true)]);

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
                    .filter(filter)
                    .score_threshold(threshold)
                    .with_payload(true),
            )
            .await
            .map_err(backend)?;

        response
            .result
            .into_iter()
            .map(|point| {
                let point_id = match point.id.and_then(|id| id.point_id_options) {
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => Uuid::parse_str(&s)
                        .map_err(|e| VectorStoreError::Payload(format!("point id: {}", e)))?,
                    _ => return Err(VectorStoreError::Payload("point id is not a uuid".to_string())),
                };
                Ok(ScoredVectorPoint {
                    point_id: MemoryId(point_id),
                    score: point.score,
                    payload: Self::from_payload(&point.payload)?,
                })
            })
            .collect()
    }

    async fn deactivate(&self, chat_id: ChatId, memory_id: MemoryId) -> Result<(), VectorStoreError> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("active".to_string(), false.into());

        let selector = Filter::must([
            Self::chat_filter(chat_id),
            Condition::matches("memory_id", memory_id.to_string()),
        ]);
        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(&self.collection, payload)
                    .points_selector(selector)
                    .wait(true),
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), VectorStoreError> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("active".to_string(), false.into());

        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(&self.collection, payload)
                    .points_selector(Filter::must([Self::chat_filter(chat_id)]))
                    .wait(true),
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn retarget(
        &self,
        _chat_id: ChatId,
        point_id: MemoryId,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("memory_type".to_string(), memory_type.code().into());
        payload.insert("memory_id".to_string(), memory_id.to_string().into());

        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(&self.collection, payload)
                    .points_selector(vec![PointId::from(point_id.to_string())])
                    .wait(true),
            )
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        let payload = MemoryPayload {
            chat_id: ChatId::new(),
            memory_type: MemoryType::LongTerm,
            memory_id: MemoryId::new(),
            active: true,
        };

        let map = QdrantVectorStore::to_payload(&payload);
        assert_eq!(QdrantVectorStore::from_payload(&map).unwrap(), payload);
    }

    #[test]
    fn test_payload_with_unknown_memory_type_is_rejected() {
        let mut map = QdrantVectorStore::to_payload(&MemoryPayload {
            chat_id: ChatId::new(),
            memory_type: MemoryType::ShortTerm,
            memory_id: MemoryId::new(),
            active: true,
        });
        map.insert("memory_type".to_string(), 7_i64.into());

        assert!(matches!(
            QdrantVectorStore::from_payload(&map),
            Err(VectorStoreError::Payload(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires a running Qdrant instance
    async fn test_search_skips_deactivated_points() {
        let store = QdrantVectorStore::new("http://localhost:6334", format!("tiermem-test-{}", Uuid::new_v4()), 3).unwrap();
        store.initialize().await.unwrap();
        let chat = ChatId::new();
        let memory = MemoryId::new();

        store.create(chat, vec![1.0, 0.0, 0.0], MemoryType::ShortTerm, memory).await.unwrap();
        assert_eq!(store.search(chat, &[1.0, 0.0, 0.0], 5, 0.5).await.unwrap().len(), 1);

        store.deactivate(chat, memory).await.unwrap();
        assert!(store.search(chat, &[1.0, 0.0, 0.0], 5, 0.5).await.unwrap().is_empty());
    }
}
