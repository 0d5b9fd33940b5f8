// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Aggregates, value objects and the traits infrastructure adapters implement.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Tool records, function deployment contracts, notifications

pub mod agent;
pub mod config;
pub mod events;
pub mod function;
pub mod notification;
pub mod repository;
pub mod storage;
pub mod tool;
