//! End-to-end incident scenarios
//!
//! Drive the halt / alert / orchestrate / resume protocol through the public
//! components with in-memory collaborators and pacing disabled.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use gantry_twin::agents::{EngineSettings, Narrator, OrchestrationEngine};
use gantry_twin::config::FeedConfig;
use gantry_twin::pipeline::{BroadcastHub, FailureInjection, IncidentCoordinator, LiveFeed, TwinState};
use gantry_twin::sources::{DecisionPolicy, FixedPolicy, MemoryPersonnelSource, MemoryTelemetrySource, RewardPolicy};
use gantry_twin::types::{FeedEvent, PolicyAction, Reading, UnitStatus};

// ============================================================================
// Harness
// ============================================================================

struct Twin {
    state: Arc<TwinState>,
    hub: Arc<BroadcastHub>,
    telemetry: Arc<MemoryTelemetrySource>,
    engine: Arc<OrchestrationEngine>,
    feed: LiveFeed,
    coordinator: IncidentCoordinator,
}

fn reading(unit: &str, rul: f64, vibration: f64, cycle: u64) -> Reading {
    Reading {
        unit_id: unit.to_string(),
        cycle,
        remaining_life: rul,
        vibration,
        sensor_s11: None,
        timestamp: Utc::now(),
    }
}

fn twin_with_policy(policy: Arc<dyn DecisionPolicy>) -> Twin {
    let state = Arc::new(TwinState::new(Duration::from_secs(30)));
    let hub = Arc::new(BroadcastHub::new(64));
    let telemetry = Arc::new(MemoryTelemetrySource::new());
    let personnel = Arc::new(MemoryPersonnelSource::with_technician("Soufiane", 4.0));
    let timeout = Duration::from_secs(2);

    let engine = Arc::new(OrchestrationEngine::new(
        Arc::clone(&state),
        telemetry.clone(),
        personnel,
        policy,
        EngineSettings::default(),
    ));
    let narrator = Arc::new(Narrator::new(Arc::clone(&engine), Arc::clone(&hub), false));
    let feed = LiveFeed::new(
        Arc::clone(&state),
        telemetry.clone(),
        Arc::clone(&hub),
        FeedConfig::default(),
        timeout,
    );
    let coordinator = IncidentCoordinator::new(
        Arc::clone(&state),
        Arc::clone(&hub),
        narrator,
        telemetry.clone(),
        timeout,
        60,
    );

    Twin {
        state,
        hub,
        telemetry,
        engine,
        feed,
        coordinator,
    }
}

fn twin() -> Twin {
    twin_with_policy(Arc::new(RewardPolicy::default()))
}

// ============================================================================
// Scenario A: injection while live freezes the unit at the failure values
// ============================================================================

#[tokio::test]
async fn scenario_a_injection_halts_alerts_and_uses_failure_reading() {
    let t = twin();
    t.telemetry.push(reading("ENGINE-001", 80.0, 0.1, 500)).await;
    let mut viewer = t.hub.subscribe().await;

    let receipt = t
        .coordinator
        .inject_failure(FailureInjection {
            unit_id: "ENGINE-001".to_string(),
            rul: 0.0,
            vibration: 0.25,
            cycle: Some(999),
            message: None,
        })
        .await
        .unwrap();

    assert!(t.state.halt.is_halted().await);
    assert_eq!(receipt.clients, 1);
    assert!(receipt.alert.is_error);

    match viewer.rx.recv().await {
        Some(FeedEvent::Alert(alert)) => {
            assert!(alert.is_error);
            assert_eq!(alert.unit_id, "ENGINE-001");
            assert_eq!(alert.cycle, Some(999));
            assert!(alert.message.contains("RUL=0"));
        }
        other => panic!("expected alert first, got {other:?}"),
    }

    // The store still holds the stale pre-failure document.
    let decision = t.engine.orchestrate("ENGINE-001").await.unwrap();
    assert_eq!(decision.reading.remaining_life, 0.0);
    assert_eq!(decision.reading.cycle, 999);
    assert_eq!(decision.status, UnitStatus::Critical);
}

#[tokio::test]
async fn scenario_a_narrated_cycle_follows_alert() {
    let t = twin();
    t.telemetry.push(reading("ENGINE-001", 80.0, 0.1, 500)).await;
    let mut viewer = t.hub.subscribe().await;

    t.coordinator.inject_failure(FailureInjection::default()).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), viewer.rx.recv()).await {
        let done = matches!(event, FeedEvent::Solution(_));
        kinds.push(event.kind());
        if done {
            break;
        }
    }

    assert_eq!(kinds.first(), Some(&"alert"));
    assert_eq!(kinds.last(), Some(&"solution"));
    assert!(kinds.iter().filter(|k| **k == "mcp_step").count() >= 10);
    assert_eq!(t.coordinator.stats().orchestrations_spawned, 1);
}

// ============================================================================
// Scenario B: resume opens a grace window that masks stale critical reads
// ============================================================================

#[tokio::test]
async fn scenario_b_resume_reports_downtime_and_masks_stale_reading() {
    let t = twin();
    // Store lags behind: still reports the failure reading after resume.
    t.telemetry.push(reading("ENGINE-001", 0.0, 0.25, 999)).await;

    let t0 = Utc::now();
    t.state
        .halt
        .trigger_failure_at(reading("ENGINE-001", 0.0, 0.25, 999), t0)
        .await
        .unwrap();

    let downtime = t.state.halt.resume_at(t0 + ChronoDuration::seconds(10)).await;
    assert!((downtime - 10.0).abs() < 0.11);

    let in_grace = t
        .feed
        .tick_payload("ENGINE-001", t0 + ChronoDuration::seconds(20))
        .await
        .unwrap();
    assert_eq!(in_grace.unit_status, UnitStatus::Healthy);
    assert_eq!(in_grace.rul, 125.0);
    assert!(!in_grace.is_error);

    let after_grace = t
        .feed
        .tick_payload("ENGINE-001", t0 + ChronoDuration::seconds(41))
        .await
        .unwrap();
    assert_eq!(after_grace.unit_status, UnitStatus::Critical);
    assert_eq!(after_grace.rul, 0.0);
}

#[tokio::test]
async fn halted_feed_serves_snapshot_to_every_viewer() {
    let t = twin();
    t.telemetry.push(reading("ENGINE-002", 90.0, 0.1, 10)).await;

    let t0 = Utc::now();
    t.state
        .halt
        .trigger_failure_at(reading("ENGINE-001", 0.0, 0.3, 999), t0)
        .await
        .unwrap();

    let payload = t
        .feed
        .tick_payload("ENGINE-002", t0 + ChronoDuration::seconds(3))
        .await
        .unwrap();
    assert_eq!(payload.unit_id, "ENGINE-001");
    assert_eq!(payload.rul, 0.0);
    assert!(payload.is_error);
    assert!(payload.system_halted);
    assert_eq!(payload.downtime_seconds, Some(3.0));
}

// ============================================================================
// Scenario C: shadow rule disagrees with a vetoing policy
// ============================================================================

#[tokio::test]
async fn scenario_c_shadow_conflict_against_policy_veto() {
    let t = twin_with_policy(Arc::new(FixedPolicy(0)));
    let r = reading("ENGINE-001", 5.0, 0.08, 180);
    let personnel = t.engine.fetch_personnel().await.unwrap();

    let evaluation = t.engine.evaluate(&r, &personnel).unwrap();
    assert_eq!(evaluation.state_vector.as_array(), [5.0, 0.08, 4.0, 350.0]);
    assert_eq!(evaluation.raw_action, PolicyAction::Veto);

    let shadow = &evaluation.shadow;
    assert_eq!(shadow.rule_decision, PolicyAction::Approve);
    assert_eq!(shadow.policy_decision, PolicyAction::Veto);
    assert!(shadow.conflict);
    assert_eq!(shadow.estimated_cost_saved, 350.0);
}

// ============================================================================
// Concurrency and re-entry
// ============================================================================

#[tokio::test]
async fn override_is_consumed_exactly_once_under_concurrency() {
    let t = twin();
    assert!(t.state.override_flag.request());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let state = Arc::clone(&t.state);
        handles.push(tokio::spawn(async move { state.override_flag.consume() }));
    }

    let mut consumed = 0;
    for h in handles {
        if h.await.unwrap() {
            consumed += 1;
        }
    }
    assert_eq!(consumed, 1);
    assert!(!t.state.override_flag.is_pending());
}

#[tokio::test]
async fn override_flips_the_next_decision_only() {
    let t = twin_with_policy(Arc::new(FixedPolicy(0)));
    t.telemetry.push(reading("ENGINE-003", 40.0, 0.1, 50)).await;

    t.state.override_flag.request();
    let first = t.engine.orchestrate("ENGINE-003").await.unwrap();
    assert!(first.overridden);
    assert_eq!(first.policy.action, PolicyAction::Approve);

    let second = t.engine.orchestrate("ENGINE-003").await.unwrap();
    assert!(!second.overridden);
    assert_eq!(second.policy.action, PolicyAction::Veto);
}

#[tokio::test]
async fn double_halt_restarts_downtime_clock() {
    let t = twin();
    let t0 = Utc::now();
    t.state
        .halt
        .trigger_failure_at(reading("ENGINE-001", 0.0, 0.25, 1), t0)
        .await
        .unwrap();
    t.state
        .halt
        .trigger_failure_at(reading("ENGINE-002", 0.0, 0.3, 2), t0 + ChronoDuration::seconds(5))
        .await
        .unwrap();

    let status = t.state.halt.status_at(t0 + ChronoDuration::seconds(6)).await;
    assert!(status.halted);
    assert_eq!(status.unit_id.as_deref(), Some("ENGINE-002"));
    assert!((status.downtime_seconds - 1.0).abs() < 0.11);
}

#[tokio::test]
async fn broadcast_removes_only_closed_subscriber() {
    let t = twin();
    let mut a = t.hub.subscribe().await;
    let gone = t.hub.subscribe().await;
    let mut c = t.hub.subscribe().await;
    drop(gone);

    let downtime = t.coordinator.resume().await;
    assert_eq!(downtime, 0.0);
    assert_eq!(t.hub.subscriber_count().await, 2);

    assert!(matches!(a.rx.recv().await, Some(FeedEvent::SystemResumed(_))));
    assert!(matches!(c.rx.recv().await, Some(FeedEvent::SystemResumed(_))));
}

#[tokio::test]
async fn unavailable_store_degrades_units_and_feed() {
    let t = twin();
    t.telemetry.push(reading("ENGINE-001", 50.0, 0.1, 5)).await;
    t.telemetry.set_unavailable(true);

    assert!(t.coordinator.list_units().await.is_empty());
    assert!(t.feed.tick_payload("ENGINE-001", Utc::now()).await.is_none());
    assert!(t.engine.orchestrate("ENGINE-001").await.is_err());
}
