mod support;

use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_sim_core::engine::{EngineState, FastForwardOutcome, SimulationEngine};
use fleet_sim_core::error::EngineError;
use fleet_sim_core::events::EventKind;
use fleet_sim_core::scenario::EngineConfig;
use fleet_sim_core::test_helpers::TEST_SEED;
use support::engine::{delivered, TestEngineBuilder};

#[tokio::test]
async fn advances_exactly_the_requested_hours_tick_by_tick() {
    let mut engine = TestEngineBuilder::new().build();
    let start = engine.current_time();
    let mut reports: Vec<(DateTime<Utc>, f64)> = Vec::new();

    let outcome = engine
        .fast_forward(2.0, |time, percent| reports.push((time, percent)))
        .await
        .expect("fast-forward");

    assert_eq!(outcome, FastForwardOutcome::Completed { ticks: 120 });
    assert_eq!((engine.current_time() - start).num_seconds(), 7_200);
    assert_eq!(engine.snapshot().tick, 120);

    assert_eq!(reports.len(), 12);
    assert!(reports.windows(2).all(|w| w[0].1 < w[1].1 && w[0].0 < w[1].0));
    assert_eq!(reports.last().map(|r| r.1), Some(100.0));
    assert_eq!(reports.last().map(|r| r.0), Some(engine.current_time()));
}

#[tokio::test]
async fn last_step_is_trimmed_to_land_on_the_target() {
    let mut engine = TestEngineBuilder::new().build();
    let start = engine.current_time();

    // 30 minutes and 9 seconds.
    let outcome = engine
        .fast_forward(0.5025, |_, _| {})
        .await
        .expect("fast-forward");

    assert_eq!(outcome, FastForwardOutcome::Completed { ticks: 31 });
    assert_eq!((engine.current_time() - start).num_seconds(), 1_809);
}

#[tokio::test]
async fn prior_state_is_restored_after_completion() {
    let mut engine = TestEngineBuilder::new().build();
    engine
        .fast_forward(0.25, |_, _| {})
        .await
        .expect("fast-forward");
    assert_eq!(engine.state(), EngineState::Stopped);

    let (mut engine, sink) = TestEngineBuilder::new().build_running();
    engine
        .fast_forward(0.25, |_, _| {})
        .await
        .expect("fast-forward");
    assert_eq!(engine.state(), EngineState::Running);

    // One consolidated snapshot closes the batch.
    assert_eq!(delivered(&sink), 1);
    let snapshots = sink.lock().expect("sink");
    assert_eq!(snapshots[0].tick, 15);
    assert!(snapshots[0]
        .events
        .iter()
        .any(|e| e.kind == EventKind::FastForwardCompleted));
}

#[tokio::test]
async fn stop_during_progress_cancels_before_the_next_tick() {
    let mut engine = TestEngineBuilder::new().build();
    let start = engine.current_time();
    let handle = engine.stop_handle();
    let mut calls = 0;

    let outcome = engine
        .fast_forward(4.0, |_, _| {
            calls += 1;
            handle.stop();
        })
        .await
        .expect("fast-forward");

    assert_eq!(outcome, FastForwardOutcome::Cancelled { ticks: 10 });
    assert_eq!(calls, 1);
    assert_eq!((engine.current_time() - start).num_seconds(), 600);
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.check_invariants().is_ok());
    assert_eq!(engine.events().count_kind(EventKind::FastForwardCancelled), 1);
}

#[tokio::test]
async fn stop_from_another_task_lands_between_ticks() {
    let mut engine = TestEngineBuilder::new().build();
    let start = engine.current_time();
    let handle = engine.stop_handle();
    // Only runs once the fast-forward yields after its first batch.
    let stopper = tokio::spawn(async move { handle.stop() });

    let outcome = engine
        .fast_forward(4.0, |_, _| {})
        .await
        .expect("fast-forward");

    assert!(stopper.is_finished());
    assert_eq!(outcome, FastForwardOutcome::Cancelled { ticks: 10 });
    assert_eq!((engine.current_time() - start).num_seconds(), 600);
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn dropping_the_future_cancels_the_run() {
    let (mut engine, sink) = TestEngineBuilder::new().build_running();
    let start = engine.current_time();

    let result = tokio::time::timeout(
        Duration::from_millis(1),
        engine.fast_forward(500.0, |_, _| {}),
    )
    .await;

    assert!(result.is_err(), "500 h should not finish within the timeout");
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!((engine.current_time() - start).num_hours() < 500);
    assert!(engine.check_invariants().is_ok());
    assert_eq!(engine.events().count_kind(EventKind::FastForwardCancelled), 1);
    assert_eq!(delivered(&sink), 1);

    // The engine is usable again once restarted.
    engine.start(|_| {});
    assert_eq!(engine.tick(Duration::from_millis(100)), Ok(true));
}

#[tokio::test]
async fn invariants_hold_at_every_intermediate_step() {
    let mut engine = TestEngineBuilder::new().with_start_hour(6).build();
    let start = engine.current_time();
    // One simulated minute per call, across the morning peak.
    for _ in 0..180 {
        let outcome = engine
            .fast_forward(1.0 / 60.0, |_, _| {})
            .await
            .expect("fast-forward");
        assert_eq!(outcome, FastForwardOutcome::Completed { ticks: 1 });
        assert!(engine.check_invariants().is_ok());
    }
    assert_eq!((engine.current_time() - start).num_hours(), 3);
}

#[tokio::test]
async fn non_positive_or_non_finite_hours_are_rejected() {
    let mut engine = TestEngineBuilder::new().build();
    let start = engine.current_time();
    for hours in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let result = engine.fast_forward(hours, |_, _| {}).await;
        assert!(matches!(result, Err(EngineError::InvalidFastForward(_))));
    }
    assert_eq!(engine.current_time(), start);
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn runtime_fault_halts_with_a_single_system_alert() {
    let latest = DateTime::<Utc>::MAX_UTC.timestamp_millis();
    let mut engine = SimulationEngine::new(
        EngineConfig::default()
            .with_seed(TEST_SEED)
            .with_start_epoch_ms(latest),
    )
    .expect("engine");

    let outcome = engine
        .fast_forward(1.0, |_, _| {})
        .await
        .expect("fast-forward");

    assert!(matches!(
        outcome,
        FastForwardOutcome::Halted {
            ticks: 0,
            error: EngineError::Clock(_)
        }
    ));
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.events().count_kind(EventKind::SystemAlert), 1);
}

#[tokio::test]
async fn same_seed_fast_forwards_to_the_same_state() {
    let mut a = TestEngineBuilder::new().with_seed(5).build();
    let mut b = TestEngineBuilder::new().with_seed(5).build();
    a.fast_forward(1.0, |_, _| {}).await.expect("a");
    b.fast_forward(1.0, |_, _| {}).await.expect("b");

    let a = a.snapshot();
    let b = b.snapshot();
    assert_eq!(a.vehicles, b.vehicles);
    assert_eq!(a.slots, b.slots);
    assert_eq!(a.congestion, b.congestion);
}
