// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Background task contract.
//!
//! Tasks carry a JSON payload and are delivered at least once, so every
//! handler must tolerate replays.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::chat::ChatId;
use super::error::MemoryError;
use super::memory::{Label, MemoryId, RelatedContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "message:classify")]
    ClassifyMessage,
    #[serde(rename = "short-term-memory:store")]
    StoreShortTerm,
    #[serde(rename = "long-term-memory:store")]
    StoreLongTerm,
    #[serde(rename = "short-term-memory:manage")]
    ManageMemory,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::ClassifyMessage => "message:classify",
            TaskKind::StoreShortTerm => "short-term-memory:store",
            TaskKind::StoreLongTerm => "long-term-memory:store",
            TaskKind::ManageMemory => "short-term-memory:manage",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound chat message awaiting classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub chat_id: ChatId,
    /// Assigned once at enqueue and kept across retries.
    pub message_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub related_context: Vec<RelatedContext>,
}

impl NewMessage {
    pub fn new(chat_id: ChatId, text: impl Into<String>, related_context: Vec<RelatedContext>) -> Self {
        Self {
            chat_id,
            message_id: Uuid::new_v4(),
            text: text.into(),
            related_context,
        }
    }

    /// Id of the memory this message becomes, stable across replays.
    pub fn memory_id(&self) -> MemoryId {
        MemoryId::for_message(self.chat_id, self.message_id)
    }
}

/// A classified message ready to be stored in its tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMessage {
    pub message: NewMessage,
    pub label: Label,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Task {
    pub fn new<P: Serialize>(kind: TaskKind, payload: &P) -> Result<Self, MemoryError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| MemoryError::InvalidPayload(e.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            payload,
        })
    }

    pub fn classify(message: &NewMessage) -> Result<Self, MemoryError> {
        Self::new(TaskKind::ClassifyMessage, message)
    }

    /// Store task matching the label, `None` for [`Label::NoMemory`].
    pub fn store(labeled: &LabeledMessage) -> Result<Option<Self>, MemoryError> {
        let kind = match labeled.label {
            Label::NoMemory => return Ok(None),
            Label::ShortTerm => TaskKind::StoreShortTerm,
            Label::LongTerm => TaskKind::StoreLongTerm,
        };
        Self::new(kind, labeled).map(Some)
    }

    pub fn manage_memory() -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TaskKind::ManageMemory,
            payload: serde_json::Value::Null,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MemoryError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| MemoryError::InvalidPayload(format!("{}: {}", self.kind, e)))
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task) -> Result<(), MemoryError>;
}

/// Executes one delivery of a task. Must be idempotent.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_payload_keeps_message_id() {
        let message = NewMessage::new(ChatId::new(), "I moved to Lisbon", vec![]);
        let task = Task::classify(&message).unwrap();

        assert_eq!(task.kind, TaskKind::ClassifyMessage);
        let decoded: NewMessage = task.decode().unwrap();
        assert_eq!(decoded.message_id, message.message_id);
        assert_eq!(decoded.memory_id(), message.memory_id());
    }

    #[test]
    fn test_store_task_follows_label() {
        let message = NewMessage::new(ChatId::new(), "hello", vec![]);
        let mut labeled = LabeledMessage {
            message,
            label: Label::NoMemory,
            embedding: vec![0.1, 0.2],
        };
        assert!(Task::store(&labeled).unwrap().is_none());

        labeled.label = Label::LongTerm;
        let task = Task::store(&labeled).unwrap().unwrap();
        assert_eq!(task.kind, TaskKind::StoreLongTerm);
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let task = Task::manage_memory();
        let err = task.decode::<NewMessage>().unwrap_err();
        assert!(matches!(err, MemoryError::InvalidPayload(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskKind::ManageMemory).unwrap(),
            "\"short-term-memory:manage\""
        );
        assert_eq!(TaskKind::StoreShortTerm.to_string(), "short-term-memory:store");
    }
}
