// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Repositories
//!
//! Production implementations of the chat and memory repositories backed by
//! the `chats`, `short_term_memories` and `long_term_memories` tables (see
//! `migrations/`). Related context is stored as a JSONB array.
//!
//! Each repository runs either against the shared pool or against one open
//! transaction handed out by [`PostgresUnitOfWork`]. The transaction sits
//! behind an async mutex so the three repositories of one unit of work can
//! share it; dropping it uncommitted rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
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

type SharedTransaction = Arc<Mutex<Option<sqlx::Transaction<'static, Postgres>>>>;

#[derive(Clone)]
enum PgHandle {
    Pool(PgPool),
    Tx(SharedTransaction),
}

enum PgConn<'a> {
    Pool(PoolConnection<Postgres>),
    Tx(MutexGuard<'a, Option<sqlx::Transaction<'static, Postgres>>>),
}

impl PgHandle {
    async fn acquire(&self) -> Result<PgConn<'_>, RepositoryError> {
        match self {
            PgHandle::Pool(pool) => Ok(PgConn::Pool(pool.acquire().await?)),
            PgHandle::Tx(tx) => Ok(PgConn::Tx(tx.lock().await)),
        }
    }
}

impl PgConn<'_> {
    fn as_mut(&mut self) -> Result<&mut PgConnection, RepositoryError> {
        match self {
            PgConn::Pool(conn) => Ok(&mut **conn),
            PgConn::Tx(guard) => guard
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or(RepositoryError::TransactionClosed),
        }
    }
}

fn repositories_over(handle: PgHandle) -> Repositories {
    Repositories {
        chats: Arc::new(PostgresChatRepository { handle: handle.clone() }),
        short_term: Arc::new(PostgresShortTermRepository { handle: handle.clone() }),
        long_term: Arc::new(PostgresLongTermRepository { handle }),
    }
}

/// Pool-scoped repositories.
pub fn repositories(pool: PgPool) -> Repositories {
    repositories_over(PgHandle::Pool(pool))
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn ids(ids: &[MemoryId]) -> Vec<Uuid> {
    ids.iter().map(|id| id.0).collect()
}

fn short_term_from_row(row: &PgRow) -> ShortTermMemory {
    let related_context: Json<Vec<RelatedContext>> = row.get("related_context");
    ShortTermMemory {
        id: MemoryId(row.get("id")),
        chat_id: ChatId(row.get("chat_id")),
        text: row.get("text"),
        access_count: count(row.get("access_count")),
        merge_count: count(row.get("merge_count")),
        merged: row.get("merged"),
        merged_message_ids: row.get("merged_message_ids"),
        created_at: row.get("created_at"),
        active: row.get("active"),
        related_context: related_context.0,
    }
}

fn long_term_from_row(row: &PgRow) -> LongTermMemory {
    let related_context: Json<Vec<RelatedContext>> = row.get("related_context");
    LongTermMemory {
        id: MemoryId(row.get("id")),
        chat_id: ChatId(row.get("chat_id")),
        text: row.get("text"),
        access_count: count(row.get("access_count")),
        created_at: row.get("created_at"),
        active: row.get("active"),
        related_context: related_context.0,
    }
}

pub struct PostgresChatRepository {
    handle: PgHandle,
}

impl PostgresChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { handle: PgHandle::Pool(pool) }
    }
}

#[async_trait]
impl ChatRepository for PostgresChatRepository {
    async fn create(&self, external_id: &str) -> Result<Chat, RepositoryError> {
        let chat = Chat::new(external_id);
        let mut conn = self.handle.acquire().await?;
        sqlx::query("INSERT INTO chats (id, external_id) VALUES ($1, $2)")
            .bind(chat.id.0)
            .bind(&chat.external_id)
            .execute(conn.as_mut()?)
            .await?;
        Ok(chat)
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<ChatId>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query("SELECT id FROM chats WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(conn.as_mut()?)
            .await?;
        Ok(row.map(|row| ChatId(row.get("id"))))
    }

    async fn get_all(&self) -> Result<Vec<Chat>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let rows = sqlx::query("SELECT id, external_id FROM chats ORDER BY external_id")
            .fetch_all(conn.as_mut()?)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Chat {
                id: ChatId(row.get("id")),
                external_id: row.get("external_id"),
            })
            .collect())
    }
}

pub struct PostgresShortTermRepository {
    handle: PgHandle,
}

impl PostgresShortTermRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { handle: PgHandle::Pool(pool) }
    }
}

#[async_trait]
impl ShortTermMemoryRepository for PostgresShortTermRepository {
    async fn create(&self, memory: NewShortTermMemory) -> Result<ShortTermMemory, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        // Returns the existing row when the id was written by an earlier attempt.
        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO short_term_memories (id, chat_id, text, created_at, related_context)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                RETURNING id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            )
            SELECT * FROM inserted
            UNION ALL
            SELECT id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            FROM short_term_memories WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(memory.id.0)
        .bind(memory.chat_id.0)
        .bind(&memory.text)
        .bind(memory.created_at)
        .bind(Json(&memory.related_context))
        .fetch_one(conn.as_mut()?)
        .await?;
        Ok(short_term_from_row(&row))
    }

    async fn get_by_id(&self, chat_id: ChatId, id: MemoryId) -> Result<Option<ShortTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            FROM short_term_memories
            WHERE id = $1 AND chat_id = $2
            "#,
        )
        .bind(id.0)
        .bind(chat_id.0)
        .fetch_optional(conn.as_mut()?)
        .await?;
        Ok(row.as_ref().map(short_term_from_row))
    }

    async fn get_by_chat_id(
        &self,
        chat_id: ChatId,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<ShortTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM short_term_memories WHERE chat_id = $1 AND active",
        )
        .bind(chat_id.0)
        .fetch_one(conn.as_mut()?)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            FROM short_term_memories
            WHERE chat_id = $1 AND active
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(chat_id.0)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(conn.as_mut()?)
        .await?;

        Ok(MemoryPage {
            memories: rows.iter().map(short_term_from_row).collect(),
            total: total as usize,
        })
    }

    async fn get_active_by_ids(&self, chat_id: ChatId, memory_ids: &[MemoryId]) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            FROM short_term_memories
            WHERE chat_id = $1 AND active AND id = ANY($2)
            "#,
        )
        .bind(chat_id.0)
        .bind(ids(memory_ids))
        .fetch_all(conn.as_mut()?)
        .await?;
        Ok(rows.iter().map(short_term_from_row).collect())
    }

    async fn register_usage(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query(
            "UPDATE short_term_memories SET access_count = access_count + 1 WHERE id = $1 AND chat_id = $2",
        )
        .bind(id.0)
        .bind(chat_id.0)
        .execute(conn.as_mut()?)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("short-term memory {}", id)));
        }
        Ok(())
    }

    async fn deactivate(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query("UPDATE short_term_memories SET active = FALSE WHERE id = $1 AND chat_id = $2")
            .bind(id.0)
            .bind(chat_id.0)
            .execute(conn.as_mut()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("short-term memory {}", id)));
        }
        Ok(())
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query("UPDATE short_term_memories SET active = FALSE WHERE chat_id = $1")
            .bind(chat_id.0)
            .execute(conn.as_mut()?)
            .await?;
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
        let mut conn = self.handle.acquire().await?;
        // A message already folded in leaves the row untouched; the second
        // branch then returns it as stored.
        let row = sqlx::query(
            r#"
            WITH updated AS (
                UPDATE short_term_memories
                SET text = $3,
                    related_context = related_context || $4,
                    merge_count = merge_count + 1,
                    merged = TRUE,
                    merged_message_ids = array_append(merged_message_ids, $5)
                WHERE id = $1 AND chat_id = $2 AND NOT ($5 = ANY(merged_message_ids))
                RETURNING id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            )
            SELECT * FROM updated
            UNION ALL
            SELECT id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            FROM short_term_memories
            WHERE id = $1 AND chat_id = $2 AND NOT EXISTS (SELECT 1 FROM updated)
            "#,
        )
        .bind(id.0)
        .bind(chat_id.0)
        .bind(text)
        .bind(Json(related_context))
        .bind(message_id)
        .fetch_optional(conn.as_mut()?)
        .await?;

        row.as_ref()
            .map(short_term_from_row)
            .ok_or_else(|| RepositoryError::NotFound(format!("short-term memory {}", id)))
    }

    async fn get_eligible_for_deactivation(
        &self,
        chat_id: ChatId,
        created_before: DateTime<Utc>,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            FROM short_term_memories
            WHERE chat_id = $1
              AND active
              AND created_at < $2
              AND access_count + merge_count < $3
            "#,
        )
        .bind(chat_id.0)
        .bind(created_before)
        .bind(i64::from(min_relevance))
        .fetch_all(conn.as_mut()?)
        .await?;
        Ok(rows.iter().map(short_term_from_row).collect())
    }

    async fn get_eligible_for_promotion(
        &self,
        chat_id: ChatId,
        min_relevance: u32,
    ) -> Result<Vec<ShortTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, merge_count, merged, merged_message_ids, created_at, active, related_context
            FROM short_term_memories
            WHERE chat_id = $1
              AND active
              AND access_count + merge_count >= $2
            "#,
        )
        .bind(chat_id.0)
        .bind(i64::from(min_relevance))
        .fetch_all(conn.as_mut()?)
        .await?;
        Ok(rows.iter().map(short_term_from_row).collect())
    }
}

pub struct PostgresLongTermRepository {
    handle: PgHandle,
}

impl PostgresLongTermRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { handle: PgHandle::Pool(pool) }
    }
}

#[async_trait]
impl LongTermMemoryRepository for PostgresLongTermRepository {
    async fn create(&self, memory: NewLongTermMemory) -> Result<LongTermMemory, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO long_term_memories (id, chat_id, text, access_count, created_at, related_context)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                RETURNING id, chat_id, text, access_count, created_at, active, related_context
            )
            SELECT * FROM inserted
            UNION ALL
            SELECT id, chat_id, text, access_count, created_at, active, related_context
            FROM long_term_memories WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(memory.id.0)
        .bind(memory.chat_id.0)
        .bind(&memory.text)
        .bind(i32::try_from(memory.access_count).unwrap_or(i32::MAX))
        .bind(memory.created_at)
        .bind(Json(&memory.related_context))
        .fetch_one(conn.as_mut()?)
        .await?;
        Ok(long_term_from_row(&row))
    }

    async fn get_by_id(&self, chat_id: ChatId, id: MemoryId) -> Result<Option<LongTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let row = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, created_at, active, related_context
            FROM long_term_memories
            WHERE id = $1 AND chat_id = $2
            "#,
        )
        .bind(id.0)
        .bind(chat_id.0)
        .fetch_optional(conn.as_mut()?)
        .await?;
        Ok(row.as_ref().map(long_term_from_row))
    }

    async fn get_by_chat_id(
        &self,
        chat_id: ChatId,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<LongTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM long_term_memories WHERE chat_id = $1 AND active",
        )
        .bind(chat_id.0)
        .fetch_one(conn.as_mut()?)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, created_at, active, related_context
            FROM long_term_memories
            WHERE chat_id = $1 AND active
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(chat_id.0)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(conn.as_mut()?)
        .await?;

        Ok(MemoryPage {
            memories: rows.iter().map(long_term_from_row).collect(),
            total: total as usize,
        })
    }

    async fn get_active_by_ids(&self, chat_id: ChatId, memory_ids: &[MemoryId]) -> Result<Vec<LongTermMemory>, RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, text, access_count, created_at, active, related_context
            FROM long_term_memories
            WHERE chat_id = $1 AND active AND id = ANY($2)
            "#,
        )
        .bind(chat_id.0)
        .bind(ids(memory_ids))
        .fetch_all(conn.as_mut()?)
        .await?;
        Ok(rows.iter().map(long_term_from_row).collect())
    }

    async fn register_usage(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query(
            "UPDATE long_term_memories SET access_count = access_count + 1 WHERE id = $1 AND chat_id = $2",
        )
        .bind(id.0)
        .bind(chat_id.0)
        .execute(conn.as_mut()?)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("long-term memory {}", id)));
        }
        Ok(())
    }

    async fn deactivate(&self, chat_id: ChatId, id: MemoryId) -> Result<(), RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query("UPDATE long_term_memories SET active = FALSE WHERE id = $1 AND chat_id = $2")
            .bind(id.0)
            .bind(chat_id.0)
            .execute(conn.as_mut()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("long-term memory {}", id)));
        }
        Ok(())
    }

    async fn deactivate_all(&self, chat_id: ChatId) -> Result<(), RepositoryError> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query("UPDATE long_term_memories SET active = FALSE WHERE chat_id = $1")
            .bind(chat_id.0)
            .execute(conn.as_mut()?)
            .await?;
        Ok(())
    }
}

pub struct PostgresUnitOfWork {
    pool: PgPool,
}

impl PostgresUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction {
            tx: Arc::new(Mutex::new(Some(tx))),
        }))
    }
}

pub struct PostgresTransaction {
    tx: SharedTransaction,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    fn repositories(&self) -> Repositories {
        repositories_over(PgHandle::Tx(self.tx.clone()))
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let tx = self.tx.lock().await.take().ok_or(RepositoryError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        let tx = self.tx.lock().await.take().ok_or(RepositoryError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
