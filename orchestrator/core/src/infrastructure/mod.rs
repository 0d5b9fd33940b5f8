// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod artifact;
pub mod cloud_functions;
pub mod db;
pub mod event_bus;
pub mod repositories;
pub mod storage;

pub use artifact::ArtifactBuilder;
pub use cloud_functions::CloudFunctionsProvider;
