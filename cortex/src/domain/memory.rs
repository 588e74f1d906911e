// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Memory Aggregates
//!
//! Short-term and long-term memory records, the labels produced by the
//! classifier and the ephemeral [`ScoredMemory`] returned by retrieval.
//!
//! Records are never hard-deleted. Setting `active = false` is a tombstone:
//! an inactive record is excluded from retrieval, scoring and every
//! eligibility query. Tier transitions only move forward
//! (short-term → long-term, or short-term → retired).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::chat::ChatId;
use super::error::MemoryError;

/// Identifier shared by a memory record and its vector point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id for the memory created from one inbound message.
    ///
    /// Replays of the same classify task derive the same id, which makes
    /// record creation and vector upserts safe to retry.
    pub fn for_message(chat_id: ChatId, message_id: Uuid) -> Self {
        let name = format!("tiermem:{}:{}", chat_id.0, message_id);
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Storage tier of a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    ShortTerm,
    LongTerm,
}

impl MemoryType {
    /// Numeric code stored in vector payloads (matches the classifier labels).
    pub fn code(self) -> i64 {
        match self {
            MemoryType::ShortTerm => 1,
            MemoryType::LongTerm => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(MemoryType::ShortTerm),
            2 => Some(MemoryType::LongTerm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::ShortTerm => "short_term",
            MemoryType::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    NoMemory,
    ShortTerm,
    LongTerm,
}

impl Label {
    /// Tier a labelled message is stored in, `None` for [`Label::NoMemory`].
    pub fn memory_type(self) -> Option<MemoryType> {
        match self {
            Label::NoMemory => None,
            Label::ShortTerm => Some(MemoryType::ShortTerm),
            Label::LongTerm => Some(MemoryType::LongTerm),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::NoMemory => "no_memory",
            Label::ShortTerm => "short_term",
            Label::LongTerm => "long_term",
        }
    }
}

impl TryFrom<i64> for Label {
    type Error = MemoryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Label::NoMemory),
            1 => Ok(Label::ShortTerm),
            2 => Ok(Label::LongTerm),
            other => Err(MemoryError::UnexpectedClassification(other)),
        }
    }
}

/// Additional textual context attached to a memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedContext {
    /// The text of the context
    pub context: String,
    /// Who produced it; a name, or simply "user and assistant"
    pub user: String,
}

impl RelatedContext {
    pub fn new(context: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermMemory {
    pub id: MemoryId,
    pub chat_id: ChatId,
    pub text: String,
    pub access_count: u32,
    pub merge_count: u32,
    pub merged: bool,
    /// Messages already folded in by `merge`; a replayed merge is a no-op.
    #[serde(default)]
    pub merged_message_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub related_context: Vec<RelatedContext>,
}

impl ShortTermMemory {
    /// Combined usage signal compared against promotion and discard thresholds.
    pub fn relevance(&self) -> u32 {
        self.access_count + self.merge_count
    }

    pub fn has_merged(&self, message_id: Uuid) -> bool {
        self.merged_message_ids.contains(&message_id)
    }
}

/// Input for creating a short-term record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShortTermMemory {
    pub id: MemoryId,
    pub chat_id: ChatId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub related_context: Vec<RelatedContext>,
}

impl NewShortTermMemory {
    pub fn into_memory(self) -> ShortTermMemory {
        ShortTermMemory {
            id: self.id,
            chat_id: self.chat_id,
            text: self.text,
            access_count: 0,
            merge_count: 0,
            merged: false,
            merged_message_ids: Vec::new(),
            created_at: self.created_at,
            active: true,
            related_context: self.related_context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermMemory {
    pub id: MemoryId,
    pub chat_id: ChatId,
    pub text: String,
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub related_context: Vec<RelatedContext>,
}

/// Input for creating a long-term record, either fresh from classification
/// or carried over from a promoted short-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLongTermMemory {
    pub id: MemoryId,
    pub chat_id: ChatId,
    pub text: String,
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub related_context: Vec<RelatedContext>,
}

impl NewLongTermMemory {
    /// Long-term copy of a short-term memory. The copy keeps the original
    /// creation time so its age keeps counting from first observation.
    pub fn promoted_from(memory: &ShortTermMemory) -> Self {
        Self {
            id: MemoryId::new(),
            chat_id: memory.chat_id,
            text: memory.text.clone(),
            access_count: memory.access_count,
            created_at: memory.created_at,
            related_context: memory.related_context.clone(),
        }
    }

    pub fn into_memory(self) -> LongTermMemory {
        LongTermMemory {
            id: self.id,
            chat_id: self.chat_id,
            text: self.text,
            access_count: self.access_count,
            created_at: self.created_at,
            active: true,
            related_context: self.related_context,
        }
    }
}

/// One page of a chat's memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPage<T> {
    pub memories: Vec<T>,
    pub total: usize,
}

/// A memory ranked for presentation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub id: MemoryId,
    pub text: String,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub memory_type: MemoryType,
    pub related_context: Vec<RelatedContext>,
}
