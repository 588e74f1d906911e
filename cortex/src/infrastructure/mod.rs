// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer: storage, vector search, inference and task delivery

pub mod db;
pub mod inference;
pub mod repositories;
pub mod task_queue;
pub mod vector;

pub use db::Database;
pub use inference::{HttpInferenceClient, OllamaCompletionProvider};
pub use repositories::InMemoryDatabase;
pub use task_queue::LocalTaskQueue;
pub use vector::{InMemoryVectorStore, QdrantVectorStore};
