// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Memory aggregates, relevancy scoring and the gateway contracts the
//! application layer depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits, no backend code

pub mod chat;
pub mod config;
pub mod error;
pub mod inference;
pub mod memory;
pub mod repository;
pub mod scoring;
pub mod task;
pub mod vector;

pub use chat::*;
pub use error::*;
pub use inference::*;
pub use memory::*;
pub use repository::*;
pub use task::*;
pub use vector::*;
