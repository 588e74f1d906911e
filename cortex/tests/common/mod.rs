// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tiermem_cortex::application::{ClassificationPipeline, RetrievalEngine, TierScheduler};
use tiermem_cortex::domain::config::MemoryManagementConfig;
use tiermem_cortex::domain::inference::{InferenceError, InferenceGateway, Prediction};
use tiermem_cortex::domain::memory::{Label, MemoryId, MemoryType, NewShortTermMemory};
use tiermem_cortex::domain::vector::{ScoredVectorPoint, VectorStore, VectorStoreError};
use tiermem_cortex::infrastructure::{InMemoryDatabase, InMemoryVectorStore};
use tiermem_cortex::{Chat, ChatId, Repositories};

/// Inference double answering from a fixed script keyed by message text.
#[derive(Default)]
pub struct ScriptedInference {
    script: Mutex<HashMap<String, (Label, Vec<f32>)>>,
    embedding_requests: Mutex<Vec<bool>>,
    embed_calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn say(&self, text: &str, label: Label, embedding: Vec<f32>) {
        self.script.lock().insert(text.to_string(), (label, embedding));
    }

    /// `with_embedding` of every `predict` call so far.
    pub fn embedding_requests(&self) -> Vec<bool> {
        self.embedding_requests.lock().clone()
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, text: &str) -> Result<(Label, Vec<f32>), InferenceError> {
        self.script
            .lock()
            .get(text)
            .cloned()
            .ok_or_else(|| InferenceError::Service(format!("no script for {:?}", text)))
    }
}

#[async_trait]
impl InferenceGateway for ScriptedInference {
    async fn predict(&self, text: &str, with_embedding: bool) -> Result<Prediction, InferenceError> {
        self.embedding_requests.lock().push(with_embedding);
        let (label, embedding) = self.lookup(text)?;
        Ok(Prediction {
            label,
            embedding: with_embedding.then_some(embedding),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(text).map(|(_, embedding)| embedding)
    }
}

/// Vector store wrapper that fails selected operations.
pub struct FaultyVectorStore {
    pub inner: InMemoryVectorStore,
    failing_creates: AtomicUsize,
    failing_chats: Mutex<HashSet<ChatId>>,
}

impl FaultyVectorStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryVectorStore::new(),
            failing_creates: AtomicUsize::new(0),
            failing_chats: Mutex::new(HashSet::new()),
        }
    }

    /// Fail the next `count` creates.
    pub fn fail_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Fail deactivation for every point of `chat_id`.
    pub fn fail_deactivation_for(&self, chat_id: ChatId) {
        self.failing_chats.lock().insert(chat_id);
    }
}

#[async_trait]
impl VectorStore for FaultyVectorStore {
    async fn create(
        &self,
        chat_id: ChatId,
        vector: Vec<f32>,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError> {
        let remaining = self.failing_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(VectorStoreError::Backend("qdrant unavailable".into()));
        }
        self.inner.create(chat_id, vector, memory_type, memory_id).await
    }

    async fn search(
        &self,
        chat_id: ChatId,
        vector: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredVectorPoint>, VectorStoreError> {
        self.inner.search(chat_id, vector, limit, threshold).await
    }

    async fn deactivate(&self, chat_id: ChatId, memory_id: MemoryId) -> Result<(), VectorStoreError> {
        if self.failing_chats.lock().contains(&chat_id) {
            return Err(VectorStoreError::Backend("qdrant unavailable".into()));
        }
        self.inner.deactivate(chat_id, memory_id).await
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), VectorStoreError> {
        self.inner.deactivate_all(chat_id).await
    }

    async fn retarget(
        &self,
        chat_id: ChatId,
        point_id: MemoryId,
        memory_type: MemoryType,
        memory_id: MemoryId,
    ) -> Result<(), VectorStoreError> {
        self.inner.retarget(chat_id, point_id, memory_type, memory_id).await
    }
}

pub fn management_config() -> MemoryManagementConfig {
    MemoryManagementConfig {
        age_limit_hours: 24,
        minimal_relevancy_for_promotion: 3,
        minimal_relevancy_for_discard: 2,
        ..MemoryManagementConfig::default()
    }
}

pub struct Harness {
    pub db: InMemoryDatabase,
    pub repos: Repositories,
    pub inference: Arc<ScriptedInference>,
    pub vectors: Arc<FaultyVectorStore>,
    pub pipeline: ClassificationPipeline,
    pub retrieval: RetrievalEngine,
    pub scheduler: Arc<TierScheduler>,
}

impl Harness {
    pub fn new() -> Self {
        let db = InMemoryDatabase::new();
        let repos = db.repositories();
        let inference = Arc::new(ScriptedInference::default());
        let vectors = Arc::new(FaultyVectorStore::new());
        let config = management_config();

        let pipeline = ClassificationPipeline::new(
            inference.clone(),
            repos.clone(),
            vectors.clone(),
            config.similarity_threshold,
        );
        let retrieval = RetrievalEngine::new(inference.clone(), repos.clone(), vectors.clone());
        let scheduler = Arc::new(TierScheduler::new(db.unit_of_work(), vectors.clone(), config));

        Self {
            db,
            repos,
            inference,
            vectors,
            pipeline,
            retrieval,
            scheduler,
        }
    }

    pub async fn chat(&self, external_id: &str) -> Chat {
        self.repos.chats.create(external_id).await.unwrap()
    }

    /// Short-term memory with its vector point, as classification would leave it.
    pub async fn seed_short_term(
        &self,
        chat_id: ChatId,
        text: &str,
        created_at: DateTime<Utc>,
        embedding: Vec<f32>,
        usage: u32,
    ) -> MemoryId {
        let id = MemoryId::new();
        self.repos
            .short_term
            .create(NewShortTermMemory {
                id,
                chat_id,
                text: text.to_string(),
                created_at,
                related_context: vec![],
            })
            .await
            .unwrap();
        for _ in 0..usage {
            self.repos.short_term.register_usage(chat_id, id).await.unwrap();
        }
        self.vectors
            .create(chat_id, embedding, MemoryType::ShortTerm, id)
            .await
            .unwrap();
        id
    }
}
