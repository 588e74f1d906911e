// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer: memory use cases composed from domain contracts

pub mod chat_service;
pub mod classification;
pub mod enhancement;
pub mod memory_service;
pub mod message_service;
pub mod orchestrator;
pub mod retrieval;
pub mod task_handlers;
pub mod tier_scheduler;

pub use chat_service::ChatService;
pub use classification::{ClassificationOutcome, ClassificationPipeline};
pub use enhancement::{EnhancedMessage, MemoryEnhancer};
pub use memory_service::MemoryService;
pub use message_service::MessageService;
pub use orchestrator::{ManagementLoop, ManagementOrchestrator, ManagementReport};
pub use retrieval::{FetchRequest, RetrievalEngine};
pub use task_handlers::MemoryTaskDispatcher;
pub use tier_scheduler::{ChatManagementOutcome, TierScheduler};
