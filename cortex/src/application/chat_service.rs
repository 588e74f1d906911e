// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Chat registration and lookup by external id.

use std::sync::Arc;
use tracing::info;

use crate::domain::chat::{Chat, ChatId};
use crate::domain::error::MemoryError;
use crate::domain::repository::ChatRepository;

#[derive(Clone)]
pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
}

impl ChatService {
    pub fn new(chats: Arc<dyn ChatRepository>) -> Self {
        Self { chats }
    }

    /// Fails with `AlreadyExists` when the external id is taken.
    pub async fn create_chat(&self, external_id: &str) -> Result<Chat, MemoryError> {
        let chat = self.chats.create(external_id).await?;
        info!(chat_id = %chat.id, external_id, "Created chat");
        Ok(chat)
    }

    pub async fn resolve(&self, external_id: &str) -> Result<ChatId, MemoryError> {
        self.chats
            .get_by_external_id(external_id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("chat {}", external_id)))
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>, MemoryError> {
        Ok(self.chats.get_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryDatabase;

    #[tokio::test]
    async fn test_resolve_registered_and_unknown_chats() {
        let service = ChatService::new(InMemoryDatabase::new().repositories().chats);
        let chat = service.create_chat("telegram-42").await.unwrap();

        assert_eq!(service.resolve("telegram-42").await.unwrap(), chat.id);
        assert!(matches!(
            service.resolve("telegram-43").await,
            Err(MemoryError::NotFound(_))
        ));
        assert!(matches!(
            service.create_chat("telegram-42").await,
            Err(MemoryError::AlreadyExists(_))
        ));
        assert_eq!(service.list_chats().await.unwrap(), vec![chat]);
    }
}
