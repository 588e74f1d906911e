// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Repository Implementations
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | In-memory | this module | development, tests |
//! | PostgreSQL | [`postgres`] | production |
//!
//! The in-memory backend keeps every table behind one `RwLock`. A
//! transaction works on a private copy of the tables and, on commit, writes
//! back only the records it changed. If any of those records was also
//! written outside the transaction while it was open, the commit fails with
//! [`RepositoryError::Conflict`] and nothing is written back.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::chat::{Chat, ChatId};
use crate::domain::memory::{
    LongTermMemory, MemoryId, MemoryPage, NewLongTermMemory, NewShortTermMemory, RelatedContext,
    ShortTermMemory,
};
use crate::domain::repository::{
    ChatRepository, LongTermMemoryRepository, Repositories, RepositoryError,
    ShortTermMemoryRepository, Transaction, UnitOfWork,
};

pub use postgres::{PostgresChatRepository, PostgresLongTermRepository, PostgresShortTermRepository, PostgresUnitOfWork};

#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    chats: HashMap<ChatId, Chat>,
    short_term: HashMap<MemoryId, ShortTermMemory>,
    long_term: HashMap<MemoryId, LongTermMemory>,
}

type SharedTables = Arc<RwLock<MemoryTables>>;

fn page<T: Clone>(mut rows: Vec<T>, limit: usize, offset: usize, key: impl Fn(&T) -> (DateTime<Utc>, MemoryId)) -> MemoryPage<T> {
    rows.sort_by_key(|row| key(row));
    let total = rows.len();
    let memories = rows.into_iter().skip(offset).take(limit).collect();
    MemoryPage { memories, total }
}

/// In-memory database. Hands out pool-scoped repositories and a unit of work
/// over the same tables.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: SharedTables,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repositories(&self) -> Repositories {
        repositories_over(self.tables.clone())
    }

    pub fn unit_of_work(&self) -> Arc<dyn UnitOfWork> {
        Arc::new(InMemoryUnitOfWork {
            tables: self.tables.clone(),
        })
    }
}

fn repositories_over(tables: SharedTables) -> Repositories {
    Repositories {
        chats: Arc::new(InMemoryChatRepository { tables: tables.clone() }),
        short_term: Arc::new(InMemoryShortTermRepository { tables: tables.clone() }),
        long_term: Arc::new(InMemoryLongTermRepository { tables }),
    }
}

pub struct InMemoryChatRepository {
    tables: SharedTables,
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn create(&self, external_id: &str) -> Result<Chat, RepositoryError> {
        let mut tables = self.tables.write();
        if tables.chats.values().any(|chat| chat.external_id == external_id) {
            return Err(RepositoryError::AlreadyExists(format!("chat {}", external_id)));
        }
        let chat = Chat::new(external_id);
        tables.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<ChatId>, RepositoryError> {
        let tables = self.tables.read();
        Ok(tables
            .chats
            .values()
            .find(|chat| chat.external_id == external_id)
            .map(|chat| chat.id))
    }

    async fn get_all(&self) -> Result<Vec<Chat>, RepositoryError> {
        let tables = self.tables.read();
        let mut chats: Vec<Chat> = tables.chats.values().cloned().collect();
        chats.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        Ok(chats)
    }
}

pub struct InMemoryShortTermRepository {
    tables: SharedTables,
}

impl InMemoryShortTermRepository {
    fn update<F>(&self, chat_id: ChatId, id: MemoryId, apply: F) -> Result<ShortTermMemory, RepositoryError>
    where
        F: FnOnce(&mut ShortTermMemory),
    {
        let mut tables = self.tables.write();
        let memory = tables
            .short_term
            .get_mut(&id)
            .filter(|m| m.chat_id == chat_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("short-term memory {}", id)))?;
        apply(memory);
        Ok(memory.clone())
    }
}

#[async_trait]
impl ShortTermMemoryRepository for InMemoryShortTermRepository {
    async fn create(&self, memory: NewShortTermMemory) -> Result<ShortTermMemory, RepositoryError> {
        let mut tables = self.tables.write();
        let stored = tables
            .short_term
            .entry(memory.id)
            .or_insert_with(|| memory.into_memory());
        Ok(stored.clone())
    }

    async fn get_by_id(&self, chat_id: ChatId, id: MemoryId) -> Result<Option<ShortTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        Ok(tables.short_term.get(&id).filter(|m| m.chat_id == chat_id).cloned())
    }

    async fn get_by_chat_id(
        &self,
        chat_id: ChatId,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<ShortTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        let rows = tables
            .short_term
            .values()
            .filter(|m| m.chat_id == chat_id && m.active)
            .cloned()
            .collect();
        Ok(page(rows, limit, offset, |m: &ShortTermMemory| (m.created_at, m.id)))
    }

    async fn get_active_by_ids(&self, chat_id: ChatId, ids: &[MemoryId]) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.short_term.get(id))
            .filter(|m| m.chat_id == chat_id && m.active)
            .cloned()
            .collect())
    }

    async fn register_usage(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        self.update(chat_id, id, |m| m.access_count += 1).map(|_| ())
    }

    async fn deactivate(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        self.update(chat_id, id, |m| m.active = false).map(|_| ())
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write();
        for memory in tables.short_term.values_mut().filter(|m| m.chat_id == chat_id) {
            memory.active = false;
        }
        Ok(())
    }

    async fn merge(
        &self,
        chat_id: ChatId,
        id: MemoryId,
        message_id: Uuid,
        text: String,
        related_context: Vec<RelatedContext>,
    ) -> Result<ShortTermMemory, RepositoryError> {
        self.update(chat_id, id, |m| {
            if m.has_merged(message_id) {
                return;
            }
            m.merged_message_ids.push(message_id);
            m.text = text;
            m.related_context.extend(related_context);
            m.merge_count += 1;
            m.merged = true;
        })
    }

    async fn get_eligible_for_deactivation(
        &self,
        chat_id: ChatId,
        created_before: DateTime<Utc>,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        Ok(tables
            .short_term
            .values()
            .filter(|m| {
                m.chat_id == chat_id
                    && m.active
                    && m.created_at < created_before
                    && m.relevance() < min_relevance
            })
            .cloned()
            .collect())
    }

    async fn get_eligible_for_promotion(
        &self,
        chat_id: ChatId,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        Ok(tables
            .short_term
            .values()
            .filter(|m| m.chat_id == chat_id && m.active && m.relevance() >= min_relevance)
            .cloned()
            .collect())
    }
}

pub struct InMemoryLongTermRepository {
    tables: SharedTables,
}

impl InMemoryLongTermRepository {
    fn update<F>(&self, chat_id: ChatId, id: MemoryId, apply: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut LongTermMemory),
    {
        let mut tables = self.tables.write();
        let memory = tables
            .long_term
            .get_mut(&id)
            .filter(|m| m.chat_id == chat_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("long-term memory {}", id)))?;
        apply(memory);
        Ok(())
    }
}

#[async_trait]
impl LongTermMemoryRepository for InMemoryLongTermRepository {
    async fn create(&self, memory: NewLongTermMemory) -> Result<LongTermMemory, RepositoryError> {
        let mut tables = self.tables.write();
        let stored = tables
            .long_term
            .entry(memory.id)
            .or_insert_with(|| memory.into_memory());
        Ok(stored.clone())
    }

    async fn get_by_id(&self, chat_id: ChatId, id: MemoryId) -> Result<Option<LongTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        Ok(tables.long_term.get(&id).filter(|m| m.chat_id == chat_id).cloned())
    }

    async fn get_by_chat_id(
        &self,
        chat_id: ChatId,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<LongTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        let rows = tables
            .long_term
            .values()
            .filter(|m| m.chat_id == chat_id && m.active)
            .cloned()
            .collect();
        Ok(page(rows, limit, offset, |m: &LongTermMemory| (m.created_at, m.id)))
    }

    async fn get_active_by_ids(&self, chat_id: ChatId, ids: &[MemoryId]) -> Result<Vec<LongTermMemory>, RepositoryError> {
        let tables = self.tables.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.long_term.get(id))
            .filter(|m| m.chat_id == chat_id && m.active)
            .cloned()
            .collect())
    }

    async fn register_usage(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        self.update(chat_id, id, |m| m.access_count += 1)
    }

    async fn deactivate(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        self.update(chat_id, id, |m| m.active = false)
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write();
        for memory in tables.long_term.values_mut().filter(|m| m.chat_id == chat_id) {
            memory.active = false;
        }
        Ok(())
    }
}

pub struct InMemoryUnitOfWork {
    tables: SharedTables,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError> {
        let base = self.tables.read().clone();
        Ok(Box::new(InMemoryTransaction {
            shared: self.tables.clone(),
            working: Arc::new(RwLock::new(base.clone())),
            base,
        }))
    }
}

/// Staged copy of the tables. Dropping it without `commit` discards every write.
pub struct InMemoryTransaction {
    shared: SharedTables,
    base: MemoryTables,
    working: SharedTables,
}

/// First record the transaction changed that no longer matches the state
/// it started from.
fn find_conflict<K, V>(shared: &HashMap<K, V>, base: &HashMap<K, V>, working: &HashMap<K, V>) -> Option<K>
where
    K: std::hash::Hash + Eq + Copy,
    V: PartialEq,
{
    working
        .iter()
        .filter(|(key, value)| base.get(*key) != Some(*value))
        .find(|(key, _)| shared.get(*key) != base.get(*key))
        .map(|(key, _)| *key)
}

fn write_back<K, V>(shared: &mut HashMap<K, V>, base: &HashMap<K, V>, working: &HashMap<K, V>)
where
    K: std::hash::Hash + Eq + Copy,
    V: PartialEq + Clone,
{
    for (key, value) in working {
        if base.get(key) != Some(value) {
            shared.insert(*key, value.clone());
        }
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    fn repositories(&self) -> Repositories {
        repositories_over(self.working.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let working = self.working.read();
        let mut shared = self.shared.write();

        if let Some(id) = find_conflict(&shared.chats, &self.base.chats, &working.chats) {
            return Err(RepositoryError::Conflict(format!("chat {}", id)));
        }
        if let Some(id) = find_conflict(&shared.short_term, &self.base.short_term, &working.short_term) {
            return Err(RepositoryError::Conflict(format!("short-term memory {}", id)));
        }
        if let Some(id) = find_conflict(&shared.long_term, &self.base.long_term, &working.long_term) {
            return Err(RepositoryError::Conflict(format!("long-term memory {}", id)));
        }

        write_back(&mut shared.chats, &self.base.chats, &working.chats);
        write_back(&mut shared.short_term, &self.base.short_term, &working.short_term);
        write_back(&mut shared.long_term, &self.base.long_term, &working.long_term);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}
