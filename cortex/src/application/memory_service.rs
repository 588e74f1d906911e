// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory Service
//!
//! Chat-facing read and reset operations, addressed by external chat id.

use std::sync::Arc;
use tracing::info;

use crate::application::chat_service::ChatService;
use crate::application::retrieval::{FetchRequest, RetrievalEngine};
use crate::domain::error::MemoryError;
use crate::domain::memory::{LongTermMemory, MemoryPage, ScoredMemory, ShortTermMemory};
use crate::domain::repository::{in_transaction, Repositories, UnitOfWork};
use crate::domain::vector::VectorStore;

pub struct MemoryService {
    chats: ChatService,
    retrieval: RetrievalEngine,
    repositories: Repositories,
    uow: Arc<dyn UnitOfWork>,
    vectors: Arc<dyn VectorStore>,
}

impl MemoryService {
    pub fn new(
        chats: ChatService,
        retrieval: RetrievalEngine,
        repositories: Repositories,
        uow: Arc<dyn UnitOfWork>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chats,
            retrieval,
            repositories,
            uow,
            vectors,
        }
    }

    pub async fn fetch(&self, external_id: &str, request: &FetchRequest) -> Result<Vec<ScoredMemory>, MemoryError> {
        let chat_id = self.chats.resolve(external_id).await?;
        self.retrieval.fetch(chat_id, request).await
    }

    pub async fn short_term_page(
        &self,
        external_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<ShortTermMemory>, MemoryError> {
        let chat_id = self.chats.resolve(external_id).await?;
        Ok(self.repositories.short_term.get_by_chat_id(chat_id, limit, offset).await?)
    }

    pub async fn long_term_page(
        &self,
        external_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage<LongTermMemory>, MemoryError> {
        let chat_id = self.chats.resolve(external_id).await?;
        Ok(self.repositories.long_term.get_by_chat_id(chat_id, limit, offset).await?)
    }

    /// Deactivate every memory of the chat in both tiers along with its
    /// vector points. The chat itself stays registered.
    pub async fn reset_chat(&self, external_id: &str) -> Result<(), MemoryError> {
        let chat_id = self.chats.resolve(external_id).await?;
        let vectors = Arc::clone(&self.vectors);

        in_transaction(self.uow.as_ref(), move |repos| async move {
            repos.short_term.deactivate_all(chat_id).await?;
            repos.long_term.deactivate_all(chat_id).await?;
            vectors.deactivate_all(chat_id).await?;
            Ok::<_, MemoryError>(())
        })
        .await?;

        info!(chat_id = %chat_id, external_id, "Reset chat memories");
        Ok(())
    }
}
