// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Toolsmith CLI

pub mod config;
pub mod function;

pub use self::config::ConfigCommand;
pub use self::function::FunctionCommand;
