// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Timing tests for the readiness wait loop.
//!
//! Runs on a paused tokio clock so the backoff schedule can be observed
//! exactly without real sleeps.

mod common;

use common::{Call, FakeFunctionProvider};
use std::time::Duration;
use tokio::time::Instant;

use toolsmith_core::domain::function::{FunctionProvider, FunctionState, DEFAULT_MAX_WAIT};
use toolsmith_core::domain::tool::FunctionId;

fn gaps_ms(times: &[Instant]) -> Vec<u64> {
    times
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect()
}

fn assert_gaps(actual: &[u64], expected: &[u64]) {
    assert_eq!(actual.len(), expected.len(), "gaps: {:?}", actual);
    for (gap, want) in actual.iter().zip(expected) {
        // paused clock rounds timer deadlines up to the next millisecond
        assert!(*gap >= *want && *gap <= *want + 1, "gap {} expected {}", gap, want);
    }
}

#[tokio::test(start_paused = true)]
async fn test_poll_delays_double_then_cap() {
    let provider = FakeFunctionProvider::new();
    let id = FunctionId::new("slow");
    provider.script_states(&id, vec![FunctionState::Deploying]);

    let started = Instant::now();
    let active = provider
        .wait_for_function_to_be_active(&id, Duration::from_millis(400_000))
        .await;

    assert!(!active);
    assert_gaps(
        &gaps_ms(&provider.poll_times()),
        &[5_000, 10_000, 20_000, 40_000, 60_000, 60_000, 60_000, 60_000, 60_000],
    );
    assert!(started.elapsed() <= Duration::from_millis(400_000 + 60_000 + 1));
}

#[tokio::test(start_paused = true)]
async fn test_default_max_wait_bounds_total_time() {
    let provider = FakeFunctionProvider::new();
    let id = FunctionId::new("stuck");
    provider.script_states(&id, vec![FunctionState::Deploying]);

    let started = Instant::now();
    let active = provider.wait_for_function_to_be_active(&id, DEFAULT_MAX_WAIT).await;
    let elapsed = started.elapsed();

    assert!(!active);
    assert_eq!(provider.poll_times().len(), 6);
    assert!(elapsed >= DEFAULT_MAX_WAIT);
    assert!(elapsed <= DEFAULT_MAX_WAIT + Duration::from_millis(60_001));
}

#[tokio::test(start_paused = true)]
async fn test_returns_true_once_active() {
    let provider = FakeFunctionProvider::new();
    let id = FunctionId::new("warming");
    provider.script_states(
        &id,
        vec![FunctionState::Deploying, FunctionState::Deploying, FunctionState::Active],
    );

    let active = provider.wait_for_function_to_be_active(&id, DEFAULT_MAX_WAIT).await;

    assert!(active);
    assert_gaps(&gaps_ms(&provider.poll_times()), &[5_000, 10_000]);
}

#[tokio::test(start_paused = true)]
async fn test_non_deploying_state_short_circuits() {
    let states = vec![
        FunctionState::Failed,
        FunctionState::Deleting,
        FunctionState::Error,
        FunctionState::Unknown("STATE_UNSPECIFIED".to_string()),
    ];

    for state in states {
        let provider = FakeFunctionProvider::new();
        let id = FunctionId::new("broken");
        provider.script_states(&id, vec![state.clone()]);

        let started = Instant::now();
        let active = provider.wait_for_function_to_be_active(&id, DEFAULT_MAX_WAIT).await;

        assert!(!active, "{} must not count as active", state);
        let polls = provider
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::State(_)))
            .count();
        assert_eq!(polls, 1, "{} must stop after the first poll", state);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_deploying_stops_polling() {
    let provider = FakeFunctionProvider::new();
    let id = FunctionId::new("flaky");
    provider.script_states(&id, vec![FunctionState::Deploying, FunctionState::Failed]);

    let active = provider.wait_for_function_to_be_active(&id, DEFAULT_MAX_WAIT).await;

    assert!(!active);
    assert_eq!(provider.poll_times().len(), 2);
}
