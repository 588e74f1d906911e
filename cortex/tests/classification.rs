// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
mod common;

use async_trait::async_trait;
use std::sync::Arc;

use common::Harness;
use tiermem_cortex::application::enhancement::ORIGINAL_MESSAGE_USER;
use tiermem_cortex::application::{ClassificationOutcome, MemoryEnhancer};
use tiermem_cortex::domain::inference::{CompletionProvider, InferenceError};
use tiermem_cortex::domain::vector::VectorStore;
use tiermem_cortex::{Label, MemoryError, MemoryType, NewMessage, RelatedContext};

#[tokio::test]
async fn test_no_memory_messages_are_discarded() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("ok thanks", Label::NoMemory, vec![1.0, 0.0, 0.0]);

    let outcome = h.pipeline.classify(NewMessage::new(chat.id, "ok thanks", vec![])).await.unwrap();

    assert_eq!(outcome, ClassificationOutcome::Discarded);
    assert_eq!(h.repos.short_term.get_by_chat_id(chat.id, 10, 0).await.unwrap().total, 0);
    assert_eq!(h.repos.long_term.get_by_chat_id(chat.id, 10, 0).await.unwrap().total, 0);
    assert!(h.vectors.inner.is_empty());
}

#[tokio::test]
async fn test_near_identical_short_term_messages_merge() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("I have a dog", Label::ShortTerm, vec![1.0, 0.0, 0.0]);
    h.inference.say("I have a dog named Rex", Label::ShortTerm, vec![0.99, 0.05, 0.0]);

    let first = h
        .pipeline
        .classify(NewMessage::new(chat.id, "I have a dog", vec![]))
        .await
        .unwrap();
    let ClassificationOutcome::Stored { memory_id, memory_type } = first else {
        panic!("expected first message to be stored, got {:?}", first);
    };
    assert_eq!(memory_type, MemoryType::ShortTerm);

    let context = vec![RelatedContext::new("what pets do you have?", "assistant")];
    let second = h
        .pipeline
        .classify(NewMessage::new(chat.id, "I have a dog named Rex", context.clone()))
        .await
        .unwrap();
    assert_eq!(second, ClassificationOutcome::Merged { into: memory_id });

    let page = h.repos.short_term.get_by_chat_id(chat.id, 10, 0).await.unwrap();
    assert_eq!(page.total, 1);
    let merged = &page.memories[0];
    assert_eq!(merged.id, memory_id);
    assert_eq!(merged.merge_count, 1);
    assert!(merged.merged);
    assert_eq!(merged.text, "I have a dog named Rex");
    assert_eq!(merged.related_context, context);
}

#[tokio::test]
async fn test_near_duplicates_of_long_term_memories_are_dropped() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("I live in Berlin", Label::LongTerm, vec![0.0, 1.0, 0.0]);
    h.inference.say("Berlin is my home", Label::ShortTerm, vec![0.02, 0.99, 0.0]);
    h.inference.say("My home is Berlin", Label::LongTerm, vec![0.0, 0.98, 0.03]);

    let stored = h
        .pipeline
        .classify(NewMessage::new(chat.id, "I live in Berlin", vec![]))
        .await
        .unwrap();
    let ClassificationOutcome::Stored { memory_id, .. } = stored else {
        panic!("expected a stored memory, got {:?}", stored);
    };

    for text in ["Berlin is my home", "My home is Berlin"] {
        let outcome = h.pipeline.classify(NewMessage::new(chat.id, text, vec![])).await.unwrap();
        assert_eq!(outcome, ClassificationOutcome::Duplicate { of: memory_id });
    }

    assert_eq!(h.repos.short_term.get_by_chat_id(chat.id, 10, 0).await.unwrap().total, 0);
    let long_term = h.repos.long_term.get_by_chat_id(chat.id, 10, 0).await.unwrap();
    assert_eq!(long_term.total, 1);
    assert_eq!(long_term.memories[0].text, "I live in Berlin");
}

#[tokio::test]
async fn test_dedup_is_scoped_to_the_chat() {
    let h = Harness::new();
    let alice = h.chat("alice").await;
    let bob = h.chat("bob").await;
    h.inference.say("I have a dog", Label::ShortTerm, vec![1.0, 0.0, 0.0]);

    h.pipeline.classify(NewMessage::new(alice.id, "I have a dog", vec![])).await.unwrap();
    let outcome = h.pipeline.classify(NewMessage::new(bob.id, "I have a dog", vec![])).await.unwrap();

    assert!(matches!(outcome, ClassificationOutcome::Stored { .. }));
}

#[tokio::test]
async fn test_replayed_classification_yields_one_record() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("I have a dog", Label::ShortTerm, vec![1.0, 0.0, 0.0]);
    let message = NewMessage::new(chat.id, "I have a dog", vec![]);

    let first = h.pipeline.classify(message.clone()).await.unwrap();
    let replay = h.pipeline.classify(message.clone()).await.unwrap();

    assert_eq!(first, replay);
    let page = h.repos.short_term.get_by_chat_id(chat.id, 10, 0).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.memories[0].id, message.memory_id());
    assert_eq!(page.memories[0].merge_count, 0);
    assert_eq!(h.vectors.inner.len(), 1);
}

#[tokio::test]
async fn test_replayed_merge_is_applied_once() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("I have a dog", Label::ShortTerm, vec![1.0, 0.0, 0.0]);
    h.inference.say("I have a dog named Rex", Label::ShortTerm, vec![0.99, 0.05, 0.0]);

    h.pipeline.classify(NewMessage::new(chat.id, "I have a dog", vec![])).await.unwrap();
    let context = vec![RelatedContext::new("what pets do you have?", "assistant")];
    let message = NewMessage::new(chat.id, "I have a dog named Rex", context.clone());

    let first = h.pipeline.classify(message.clone()).await.unwrap();
    let replay = h.pipeline.classify(message.clone()).await.unwrap();

    assert_eq!(first, replay);
    let page = h.repos.short_term.get_by_chat_id(chat.id, 10, 0).await.unwrap();
    assert_eq!(page.total, 1);
    let merged = &page.memories[0];
    assert_eq!(merged.merge_count, 1);
    assert_eq!(merged.related_context, context);
    assert_eq!(merged.merged_message_ids, vec![message.message_id]);
    assert_eq!(h.vectors.inner.len(), 1);
}

#[tokio::test]
async fn test_replay_completes_interrupted_store() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("I have a dog", Label::ShortTerm, vec![1.0, 0.0, 0.0]);
    let message = NewMessage::new(chat.id, "I have a dog", vec![]);

    h.vectors.fail_creates(1);
    let err = h.pipeline.classify(message.clone()).await.unwrap_err();
    assert!(matches!(err, MemoryError::VectorStore(_)));
    assert!(err.is_retryable());
    assert!(h.vectors.inner.is_empty());

    let outcome = h.pipeline.classify(message.clone()).await.unwrap();
    assert_eq!(
        outcome,
        ClassificationOutcome::Stored {
            memory_id: message.memory_id(),
            memory_type: MemoryType::ShortTerm
        }
    );
    assert_eq!(h.repos.short_term.get_by_chat_id(chat.id, 10, 0).await.unwrap().total, 1);
    let payload = h.vectors.inner.payload(message.memory_id()).unwrap();
    assert!(payload.active);
}

#[tokio::test]
async fn test_replay_does_not_resurrect_evicted_memory() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("I have a dog", Label::ShortTerm, vec![1.0, 0.0, 0.0]);
    let message = NewMessage::new(chat.id, "I have a dog", vec![]);
    let id = message.memory_id();

    h.pipeline.classify(message.clone()).await.unwrap();
    h.repos.short_term.deactivate(chat.id, id).await.unwrap();
    h.vectors.deactivate(chat.id, id).await.unwrap();

    h.pipeline.classify(message).await.unwrap();

    assert_eq!(h.repos.short_term.get_by_chat_id(chat.id, 10, 0).await.unwrap().total, 0);
    assert!(!h.vectors.inner.payload(id).unwrap().active);
}

#[tokio::test]
async fn test_store_long_term_entry_point() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    let labeled = tiermem_cortex::LabeledMessage {
        message: NewMessage::new(chat.id, "My birthday is in May", vec![]),
        label: Label::LongTerm,
        embedding: vec![0.0, 0.0, 1.0],
    };

    let id = h.pipeline.store_long_term(&labeled).await.unwrap();
    let again = h.pipeline.store_long_term(&labeled).await.unwrap();

    assert_eq!(id, again);
    assert_eq!(h.repos.long_term.get_by_chat_id(chat.id, 10, 0).await.unwrap().total, 1);
    let payload = h.vectors.inner.payload(id).unwrap();
    assert_eq!(payload.memory_type, MemoryType::LongTerm);
}

#[tokio::test]
async fn test_unknown_label_is_not_retried() {
    struct BadLabel;

    #[async_trait]
    impl tiermem_cortex::InferenceGateway for BadLabel {
        async fn predict(&self, _text: &str, _with_embedding: bool) -> Result<tiermem_cortex::Prediction, InferenceError> {
            Err(InferenceError::UnexpectedLabel(7))
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![1.0])
        }
    }

    let h = Harness::new();
    let chat = h.chat("c").await;
    let pipeline = tiermem_cortex::application::ClassificationPipeline::new(
        Arc::new(BadLabel),
        h.repos.clone(),
        h.vectors.clone(),
        0.9,
    );

    let err = pipeline.classify(NewMessage::new(chat.id, "hi", vec![])).await.unwrap_err();
    assert!(matches!(err, MemoryError::UnexpectedClassification(7)));
    assert!(!err.is_retryable());
}

struct Rewriter;

#[async_trait]
impl CompletionProvider for Rewriter {
    async fn complete(&self, _prompt: &str) -> Result<String, InferenceError> {
        Ok("The user has a dog named Rex.".to_string())
    }

    async fn health_check(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_enhanced_messages_keep_the_original_as_context() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("rex is my dog lol", Label::ShortTerm, vec![1.0, 0.0, 0.0]);
    h.inference.say("The user has a dog named Rex.", Label::ShortTerm, vec![0.0, 1.0, 0.0]);

    let pipeline = tiermem_cortex::application::ClassificationPipeline::new(
        h.inference.clone(),
        h.repos.clone(),
        h.vectors.clone(),
        0.9,
    )
    .with_enhancer(MemoryEnhancer::new(Arc::new(Rewriter), h.inference.clone()));

    let outcome = pipeline
        .classify(NewMessage::new(chat.id, "rex is my dog lol", vec![]))
        .await
        .unwrap();
    let ClassificationOutcome::Stored { memory_id, .. } = outcome else {
        panic!("expected a stored memory, got {:?}", outcome);
    };

    let memory = h.repos.short_term.get_by_id(chat.id, memory_id).await.unwrap().unwrap();
    assert_eq!(memory.text, "The user has a dog named Rex.");
    assert_eq!(
        memory.related_context,
        vec![RelatedContext::new("rex is my dog lol", ORIGINAL_MESSAGE_USER)]
    );

    let hits = h.vectors.search(chat.id, &[0.0, 1.0, 0.0], 1, 0.99).await.unwrap();
    assert_eq!(hits[0].point_id, memory_id);
    // The rewrite is embedded by the enhancer, so the classifier skips it.
    assert_eq!(h.inference.embedding_requests(), vec![false]);
    assert_eq!(h.inference.embed_calls(), 1);
}

struct Unavailable;

#[async_trait]
impl CompletionProvider for Unavailable {
    async fn complete(&self, _prompt: &str) -> Result<String, InferenceError> {
        Err(InferenceError::Network("connection refused".into()))
    }

    async fn health_check(&self) -> Result<(), InferenceError> {
        Err(InferenceError::Network("connection refused".into()))
    }
}

#[tokio::test]
async fn test_failed_enhancement_embeds_the_original_text() {
    let h = Harness::new();
    let chat = h.chat("c").await;
    h.inference.say("rex is my dog lol", Label::LongTerm, vec![1.0, 0.0, 0.0]);

    let pipeline = tiermem_cortex::application::ClassificationPipeline::new(
        h.inference.clone(),
        h.repos.clone(),
        h.vectors.clone(),
        0.9,
    )
    .with_enhancer(MemoryEnhancer::new(Arc::new(Unavailable), h.inference.clone()));

    let outcome = pipeline
        .classify(NewMessage::new(chat.id, "rex is my dog lol", vec![]))
        .await
        .unwrap();
    let ClassificationOutcome::Stored { memory_id, memory_type } = outcome else {
        panic!("expected a stored memory, got {:?}", outcome);
    };

    assert_eq!(memory_type, MemoryType::LongTerm);
    let memory = h.repos.long_term.get_by_id(chat.id, memory_id).await.unwrap().unwrap();
    assert_eq!(memory.text, "rex is my dog lol");
    assert!(memory.related_context.is_empty());
    assert_eq!(h.inference.embedding_requests(), vec![false]);
    assert_eq!(h.inference.embed_calls(), 1);
    let hits = h.vectors.search(chat.id, &[1.0, 0.0, 0.0], 1, 0.99).await.unwrap();
    assert_eq!(hits[0].point_id, memory_id);
}
