// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! tiermem cortex
//!
//! Memory lifecycle engine for conversational agents: classifies inbound
//! messages into short-term and long-term memories, ranks them for recall
//! and periodically promotes or evicts short-term memories per chat.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** `domain` holds types and contracts, `application` the use
//!   cases, `infrastructure` the backends

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
