// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for tiermem CLI

pub mod chat;
pub mod config;
pub mod manage;
pub mod memory;
pub mod message;
pub mod worker;

pub use self::chat::ChatCommand;
pub use self::config::ConfigCommand;
pub use self::memory::MemoryCommand;
pub use self::message::MessageCommand;
