// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Toolsmith Core
//!
//! Function tool deployment: packaging user code, deploying it to a serverless
//! backend, polling for readiness and reconciling the outcome into tool records.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, use cases and backend adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
