// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use common::Harness;
use tiermem_cortex::application::{FetchRequest, RetrievalEngine};
use tiermem_cortex::{
    ChatId, Label, MemoryId, MemoryPage, MemoryType, NewLongTermMemory, RelatedContext, Repositories,
    RepositoryError, ShortTermMemory, ShortTermMemoryRepository, VectorStore,
};

/// Counts reads that reach the backing repository.
struct CountingShortTerm {
    inner: Arc<dyn ShortTermMemoryRepository>,
    loads: AtomicUsize,
}

#[async_trait]
impl ShortTermMemoryRepository for CountingShortTerm {
    async fn create(
        &self,
        memory: tiermem_cortex::NewShortTermMemory,
    ) -> Result<ShortTermMemory, RepositoryError> {
        self.inner.create(memory).await
    }

    async fn get_by_id(&self, chat_id: ChatId, id: MemoryId) -> Result<Option<ShortTermMemory>, RepositoryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_id(chat_id, id).await
    }

    async fn get_by_chat_id(
        &self,
        chat_id: ChatId,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<ShortTermMemory>, RepositoryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_chat_id(chat_id, limit, offset).await
    }

    async fn get_active_by_ids(&self, chat_id: ChatId, ids: &[MemoryId]) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_active_by_ids(chat_id, ids).await
    }

    async fn register_usage(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        self.inner.register_usage(chat_id, id).await
    }

    async fn deactivate(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        self.inner.deactivate(chat_id, id).await
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), RepositoryError> {
        self.inner.deactivate_all(chat_id).await
    }

    async fn merge(
        &self,
        chat_id: ChatId,
        id: MemoryId,
        message_id: Uuid,
        text: String,
        related_context: Vec<RelatedContext>,
    ) -> Result<ShortTermMemory, RepositoryError> {
        self.inner.merge(chat_id, id, message_id, text, related_context).await
    }

    async fn get_eligible_for_deactivation(
        &self,
        chat_id: ChatId,
        created_before: DateTime<Utc>,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        self.inner
            .get_eligible_for_deactivation(chat_id, created_before, min_relevance)
            .await
    }

    async fn get_eligible_for_promotion(
        &self,
        chat_id: ChatId,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        self.inner.get_eligible_for_promotion(chat_id, min_relevance).await
    }
}

#[tokio::test]
async fn test_scoring_no_ids_skips_the_backend() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    let counting = CountingShortTerm {
        inner: h.repos.short_term.clone(),
        loads: AtomicUsize::new(0),
    };

    let scored = counting.get_scored(chat.id, &[]).await.unwrap();

    assert!(scored.is_empty());
    assert_eq!(counting.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetch_without_vectors_is_empty() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    let counting = Arc::new(CountingShortTerm {
        inner: h.repos.short_term.clone(),
        loads: AtomicUsize::new(0),
    });
    let repos = Repositories {
        chats: h.repos.chats.clone(),
        short_term: counting.clone(),
        long_term: h.repos.long_term.clone(),
    };
    let engine = RetrievalEngine::new(h.inference.clone(), repos, h.vectors.clone());
    h.inference.say("anything", Label::NoMemory, vec![1.0, 0.0]);

    let fetched = engine.fetch(chat.id, &FetchRequest::new("anything")).await.unwrap();

    assert!(fetched.is_empty());
    assert_eq!(counting.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetch_ranks_and_registers_usage_of_returned_memories_only() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    let created_at = Utc::now() - Duration::hours(10);

    let busy = h.seed_short_term(chat.id, "busy", created_at, vec![1.0, 0.0], 4).await;
    let idle = h.seed_short_term(chat.id, "idle", created_at, vec![1.0, 0.05], 0).await;
    let some = h.seed_short_term(chat.id, "some", created_at, vec![1.0, 0.1], 2).await;
    h.inference.say("query", Label::NoMemory, vec![1.0, 0.0]);

    let fetched = h.retrieval.fetch(chat.id, &FetchRequest::new("query")).await.unwrap();

    assert_eq!(fetched.iter().map(|m| m.id).collect::<Vec<_>>(), vec![busy, some]);
    assert!(fetched[0].score > fetched[1].score);
    assert!(fetched.iter().all(|m| (0.0..=1.0).contains(&m.score)));

    for (id, expected) in [(busy, 5), (some, 3), (idle, 0)] {
        let memory = h.repos.short_term.get_by_id(chat.id, id).await.unwrap().unwrap();
        assert_eq!(memory.access_count, expected, "{}", memory.text);
    }
}

#[tokio::test]
async fn test_long_term_candidates_need_the_long_term_threshold() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    let created_at = Utc::now() - Duration::hours(3);

    let short = h.seed_short_term(chat.id, "short", created_at, vec![1.0, 0.1], 0).await;
    let long = h
        .repos
        .long_term
        .create(NewLongTermMemory {
            id: MemoryId::new(),
            chat_id: chat.id,
            text: "long".to_string(),
            access_count: 0,
            created_at,
            related_context: vec![],
        })
        .await
        .unwrap();
    // cosine with the query is about 0.71: above the search threshold, below the long-term one
    h.vectors
        .create(chat.id, vec![1.0, 1.0], MemoryType::LongTerm, long.id)
        .await
        .unwrap();
    h.inference.say("query", Label::NoMemory, vec![1.0, 0.0]);

    let request = FetchRequest::new("query").with_limit(10);
    let fetched = h.retrieval.fetch(chat.id, &request).await.unwrap();
    assert_eq!(fetched.iter().map(|m| m.id).collect::<Vec<_>>(), vec![short]);

    let relaxed = FetchRequest {
        long_term_threshold: 0.7,
        ..request
    };
    let fetched = h.retrieval.fetch(chat.id, &relaxed).await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert!(fetched.iter().any(|m| m.id == long.id && m.memory_type == MemoryType::LongTerm));
}

#[tokio::test]
async fn test_zero_limit_returns_nothing() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    let id = h.seed_short_term(chat.id, "x", Utc::now(), vec![1.0, 0.0], 0).await;

    let fetched = h
        .retrieval
        .fetch(chat.id, &FetchRequest::new("unscripted").with_limit(0))
        .await
        .unwrap();

    assert!(fetched.is_empty());
    let memory = h.repos.short_term.get_by_id(chat.id, id).await.unwrap().unwrap();
    assert_eq!(memory.access_count, 0);
}

#[tokio::test]
async fn test_inference_failure_surfaces_to_the_caller() {
    let h = Harness::new();
    let chat = h.chat("c").await;

    let err = h
        .retrieval
        .fetch(chat.id, &FetchRequest::new("unscripted"))
        .await
        .unwrap_err();

    assert!(matches!(err, tiermem_cortex::MemoryError::InferenceUnavailable(_)));
}
