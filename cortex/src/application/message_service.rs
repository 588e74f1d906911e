// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Accepts chat messages and hands them to the task queue for classification.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::application::chat_service::ChatService;
use crate::domain::error::MemoryError;
use crate::domain::memory::RelatedContext;
use crate::domain::task::{NewMessage, Task, TaskQueue};

pub struct MessageService {
    chats: ChatService,
    queue: Arc<dyn TaskQueue>,
}

impl MessageService {
    pub fn new(chats: ChatService, queue: Arc<dyn TaskQueue>) -> Self {
        Self { chats, queue }
    }

    /// Returns the message id the eventual memory is derived from.
    pub async fn add_message(
        &self,
        external_id: &str,
        text: &str,
        related_context: Vec<RelatedContext>,
    ) -> Result<Uuid, MemoryError> {
        let chat_id = self.chats.resolve(external_id).await?;
        let message = NewMessage::new(chat_id, text, related_context);
        let message_id = message.message_id;

        self.queue.enqueue(Task::classify(&message)?).await?;
        debug!(chat_id = %chat_id, message_id = %message_id, "Queued message for classification");
        Ok(message_id)
    }
}
