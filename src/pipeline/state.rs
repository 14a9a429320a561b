//! Twin State and System Halt Machine
//!
//! Process-wide shared state, owned explicitly and handed to every component
//! behind an `Arc<TwinState>`:
//! - [`SystemStateMachine`]: LIVE / HALTED with the frozen failure snapshot
//! - [`OverrideFlag`]: one-shot human override
//! - [`DecisionSlot`]: most recent decision, last-write-wins
//! - latest live telemetry tick (chat context)

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::types::{round1, Decision, Reading, TelemetryPayload};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Refusing to halt on invalid reading for {unit_id}: rul={remaining_life}, vibration={vibration}")]
    InvalidReading {
        unit_id: String,
        remaining_life: f64,
        vibration: f64,
    },
}

// ============================================================================
// Halt State
// ============================================================================

/// Exactly one per process. A snapshot exists iff the system is halted.
#[derive(Debug, Clone, PartialEq)]
pub enum HaltState {
    Live {
        /// Stale critical readings are masked until this instant.
        resume_grace_until: Option<DateTime<Utc>>,
    },
    Halted {
        snapshot: Reading,
        halted_at: DateTime<Utc>,
    },
}

impl HaltState {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }
}

/// Halt status as reported to the dashboard.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HaltStatus {
    pub halted: bool,
    pub unit_id: Option<String>,
    pub failure_timestamp: Option<DateTime<Utc>>,
    pub downtime_seconds: f64,
    pub grace_active: bool,
}

/// Seconds between `from` and `to`, rounded to 0.1 and never negative.
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let secs = (to - from).num_milliseconds() as f64 / 1000.0;
    round1(secs.max(0.0))
}

struct HaltInner {
    state: HaltState,
    alerted_units: HashSet<String>,
}

/// LIVE / HALTED state machine. Initial state is LIVE with no grace window.
pub struct SystemStateMachine {
    inner: Mutex<HaltInner>,
    grace: chrono::Duration,
}

impl SystemStateMachine {
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: Mutex::new(HaltInner {
                state: HaltState::Live {
                    resume_grace_until: None,
                },
                alerted_units: HashSet::new(),
            }),
            grace: chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    pub async fn trigger_failure(&self, reading: Reading) -> Result<(), StateError> {
        self.trigger_failure_at(reading, Utc::now()).await
    }

    /// Enter HALTED with `reading` frozen as the snapshot.
    ///
    /// Halting while already halted replaces the snapshot and restarts the
    /// downtime clock. Any grace window is discarded.
    pub async fn trigger_failure_at(&self, reading: Reading, now: DateTime<Utc>) -> Result<(), StateError> {
        if !reading.is_well_formed() {
            return Err(StateError::InvalidReading {
                unit_id: reading.unit_id,
                remaining_life: reading.remaining_life,
                vibration: reading.vibration,
            });
        }

        let unit_id = reading.unit_id.clone();
        let mut inner = self.inner.lock().await;
        let was_halted = inner.state.is_halted();
        inner.state = HaltState::Halted {
            snapshot: reading,
            halted_at: now,
        };
        drop(inner);

        info!(unit_id = %unit_id, re_halt = was_halted, "[SystemState] HALTED, dashboard frozen at failure values");
        Ok(())
    }

    pub async fn resume(&self) -> f64 {
        self.resume_at(Utc::now()).await
    }

    /// Return to LIVE, open the grace window and clear the alerted set.
    ///
    /// Returns the downtime in seconds (0 if the system was not halted).
    pub async fn resume_at(&self, now: DateTime<Utc>) -> f64 {
        let mut inner = self.inner.lock().await;
        let downtime = match &inner.state {
            HaltState::Halted { halted_at, .. } => elapsed_seconds(*halted_at, now),
            HaltState::Live { .. } => 0.0,
        };
        inner.state = HaltState::Live {
            resume_grace_until: Some(now + self.grace),
        };
        inner.alerted_units.clear();
        drop(inner);

        info!(downtime_seconds = downtime, grace_secs = self.grace.num_seconds(), "[SystemState] Resumed, grace window active");
        downtime
    }

    pub async fn current(&self) -> HaltState {
        self.inner.lock().await.state.clone()
    }

    pub async fn is_halted(&self) -> bool {
        self.inner.lock().await.state.is_halted()
    }

    /// Frozen snapshot, only if halted on `unit_id`.
    pub async fn halted_snapshot_for(&self, unit_id: &str) -> Option<Reading> {
        match &self.inner.lock().await.state {
            HaltState::Halted { snapshot, .. } if snapshot.unit_id == unit_id => Some(snapshot.clone()),
            _ => None,
        }
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> HaltStatus {
        match &self.inner.lock().await.state {
            HaltState::Halted { snapshot, halted_at } => HaltStatus {
                halted: true,
                unit_id: Some(snapshot.unit_id.clone()),
                failure_timestamp: Some(*halted_at),
                downtime_seconds: elapsed_seconds(*halted_at, now),
                grace_active: false,
            },
            HaltState::Live { resume_grace_until } => HaltStatus {
                halted: false,
                unit_id: None,
                failure_timestamp: None,
                downtime_seconds: 0.0,
                grace_active: resume_grace_until.is_some_and(|until| now < until),
            },
        }
    }

    /// Record that `unit_id` has been alerted. Returns `false` if it already was.
    pub async fn mark_alerted(&self, unit_id: &str) -> bool {
        self.inner.lock().await.alerted_units.insert(unit_id.to_string())
    }

    pub async fn alerted_count(&self) -> usize {
        self.inner.lock().await.alerted_units.len()
    }
}

// ============================================================================
// Override Flag
// ============================================================================

/// One pending human override. Setting is idempotent; consumption is atomic.
#[derive(Debug, Default)]
pub struct OverrideFlag(AtomicBool);

impl OverrideFlag {
    /// Arm the override. Returns `true` if it was not already pending.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Check-and-clear. Exactly one caller observes `true` per request.
    pub fn consume(&self) -> bool {
        self.0
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ============================================================================
// Decision Slot
// ============================================================================

/// Most recent decision. Concurrent cycles race; the last store wins.
#[derive(Default)]
pub struct DecisionSlot(ArcSwapOption<Decision>);

impl DecisionSlot {
    pub fn store(&self, decision: Decision) -> Arc<Decision> {
        let decision = Arc::new(decision);
        self.0.store(Some(Arc::clone(&decision)));
        decision
    }

    pub fn latest(&self) -> Option<Arc<Decision>> {
        self.0.load_full()
    }
}

// ============================================================================
// Twin State
// ============================================================================

pub struct TwinState {
    pub halt: SystemStateMachine,
    pub override_flag: OverrideFlag,
    pub last_decision: DecisionSlot,
    last_live: ArcSwapOption<TelemetryPayload>,
}

impl TwinState {
    pub fn new(grace: Duration) -> Self {
        Self {
            halt: SystemStateMachine::new(grace),
            override_flag: OverrideFlag::default(),
            last_decision: DecisionSlot::default(),
            last_live: ArcSwapOption::empty(),
        }
    }

    pub fn remember_live_tick(&self, payload: &TelemetryPayload) {
        self.last_live.store(Some(Arc::new(payload.clone())));
    }

    pub fn last_live_tick(&self) -> Option<Arc<TelemetryPayload>> {
        self.last_live.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(unit: &str, rul: f64) -> Reading {
        Reading {
            unit_id: unit.to_string(),
            cycle: 999,
            remaining_life: rul,
            vibration: 0.25,
            sensor_s11: Some(50.0),
            timestamp: Utc::now(),
        }
    }

    fn machine() -> SystemStateMachine {
        SystemStateMachine::new(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_initial_state_is_live() {
        let sm = machine();
        assert_eq!(sm.current().await, HaltState::Live { resume_grace_until: None });
        assert!(!sm.status_at(Utc::now()).await.halted);
    }

    #[tokio::test]
    async fn test_halt_then_resume_reports_downtime() {
        let sm = machine();
        let t0 = Utc::now();
        sm.trigger_failure_at(reading("ENGINE-001", 0.0), t0).await.unwrap();
        assert!(sm.is_halted().await);

        let downtime = sm.resume_at(t0 + chrono::Duration::milliseconds(10_040)).await;
        assert_eq!(downtime, 10.0);

        match sm.current().await {
            HaltState::Live { resume_grace_until } => {
                assert_eq!(resume_grace_until, Some(t0 + chrono::Duration::milliseconds(40_040)));
            }
            HaltState::Halted { .. } => panic!("expected LIVE after resume"),
        }
        assert!(sm.halted_snapshot_for("ENGINE-001").await.is_none());
    }

    #[tokio::test]
    async fn test_double_halt_resets_clock_and_snapshot() {
        let sm = machine();
        let t0 = Utc::now();
        sm.trigger_failure_at(reading("ENGINE-001", 1.0), t0).await.unwrap();
        let t1 = t0 + chrono::Duration::seconds(20);
        sm.trigger_failure_at(reading("ENGINE-002", 0.0), t1).await.unwrap();

        let status = sm.status_at(t1 + chrono::Duration::seconds(5)).await;
        assert_eq!(status.downtime_seconds, 5.0);
        assert_eq!(status.unit_id.as_deref(), Some("ENGINE-002"));
        assert!(sm.halted_snapshot_for("ENGINE-001").await.is_none());
        assert_eq!(
            sm.halted_snapshot_for("ENGINE-002").await.map(|r| r.remaining_life),
            Some(0.0)
        );
    }

    #[tokio::test]
    async fn test_resume_while_live_is_zero() {
        let sm = machine();
        let now = Utc::now();
        assert_eq!(sm.resume_at(now).await, 0.0);
        assert!(sm.status_at(now).await.grace_active);
        assert!(!sm.status_at(now + chrono::Duration::seconds(31)).await.grace_active);
    }

    #[tokio::test]
    async fn test_invalid_reading_rejected() {
        let sm = machine();
        let mut bad = reading("ENGINE-001", 0.0);
        bad.vibration = f64::NAN;
        assert!(sm.trigger_failure(bad).await.is_err());
        assert!(!sm.is_halted().await);
    }

    #[tokio::test]
    async fn test_halt_discards_grace_window() {
        let sm = machine();
        let now = Utc::now();
        sm.resume_at(now).await;
        sm.trigger_failure_at(reading("ENGINE-001", 0.0), now).await.unwrap();
        assert!(!sm.status_at(now).await.grace_active);
    }

    #[tokio::test]
    async fn test_alerted_set_cleared_on_resume() {
        let sm = machine();
        assert!(sm.mark_alerted("ENGINE-001").await);
        assert!(!sm.mark_alerted("ENGINE-001").await);
        sm.resume().await;
        assert_eq!(sm.alerted_count().await, 0);
        assert!(sm.mark_alerted("ENGINE-001").await);
    }

    #[test]
    fn test_override_is_one_shot_and_idempotent() {
        let flag = OverrideFlag::default();
        assert!(!flag.consume());
        assert!(flag.request());
        assert!(!flag.request());
        assert!(flag.is_pending());
        assert!(flag.consume());
        assert!(!flag.consume());
    }

    #[test]
    fn test_override_consumed_once_across_threads() {
        let flag = Arc::new(OverrideFlag::default());
        flag.request();
        let winners: usize = (0..8)
            .map(|_| {
                let f = Arc::clone(&flag);
                std::thread::spawn(move || f.consume())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }
}
