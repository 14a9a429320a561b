//! Live Feed - per-viewer telemetry tick loop
//!
//! Every connected viewer runs one [`LiveFeed::run_viewer`] loop. It owns a
//! hub subscription for ad hoc broadcasts and interleaves them with its own
//! periodic telemetry ticks:
//!
//! ```text
//! HALTED ──► frozen snapshot + downtime, CRITICAL        (every 2 s)
//! LIVE   ──► store latest, classified                    (every 5 s)
//!   └─ grace window + rul < 1 ──► synthesized healthy payload
//! ```
//!
//! A store error skips the beat. Cancelling the viewer's token (disconnect)
//! ends only that loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::broadcast::{BroadcastHub, Subscription};
use super::state::{elapsed_seconds, HaltState, TwinState};
use crate::config::{defaults, FeedConfig};
use crate::sources::{with_deadline, TelemetrySource};
use crate::types::{FeedEvent, Reading, TelemetryPayload, UnitStatus};

// ============================================================================
// Sink
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Viewer connection closed")]
    Closed,
    #[error("Failed to encode feed event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Where a viewer's events go (a WebSocket in production, a channel in tests).
#[async_trait]
pub trait FeedSink: Send {
    async fn send(&mut self, event: &FeedEvent) -> Result<(), FeedError>;
}

#[async_trait]
impl FeedSink for mpsc::Sender<FeedEvent> {
    async fn send(&mut self, event: &FeedEvent) -> Result<(), FeedError> {
        mpsc::Sender::send(self, event.clone())
            .await
            .map_err(|_| FeedError::Closed)
    }
}

// ============================================================================
// Live Feed
// ============================================================================

pub struct LiveFeed {
    state: Arc<TwinState>,
    telemetry: Arc<dyn TelemetrySource>,
    hub: Arc<BroadcastHub>,
    config: FeedConfig,
    request_timeout: Duration,
}

impl LiveFeed {
    pub fn new(
        state: Arc<TwinState>,
        telemetry: Arc<dyn TelemetrySource>,
        hub: Arc<BroadcastHub>,
        config: FeedConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            state,
            telemetry,
            hub,
            config,
            request_timeout,
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Sleep between ticks for the current halt state.
    pub async fn tick_interval(&self) -> Duration {
        if self.state.halt.is_halted().await {
            Duration::from_secs(self.config.halted_interval_secs)
        } else {
            Duration::from_secs(self.config.live_interval_secs)
        }
    }

    /// Build this tick's payload for `unit_id`, or `None` to skip the beat.
    ///
    /// While halted every viewer receives the frozen snapshot, whichever unit
    /// it is watching.
    pub async fn tick_payload(&self, unit_id: &str, now: DateTime<Utc>) -> Option<TelemetryPayload> {
        let resume_grace_until = match self.state.halt.current().await {
            HaltState::Halted { snapshot, halted_at } => {
                return Some(halted_payload(&snapshot, elapsed_seconds(halted_at, now)));
            }
            HaltState::Live { resume_grace_until } => resume_grace_until,
        };

        let reading = match with_deadline(self.request_timeout, self.telemetry.latest(unit_id)).await {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                debug!(unit_id, "[LiveFeed] No telemetry yet");
                return None;
            }
            Err(e) => {
                warn!(unit_id, error = %e, "[LiveFeed] Telemetry fetch failed, skipping tick");
                return None;
            }
        };

        let in_grace = resume_grace_until.is_some_and(|until| now < until);
        let payload = if in_grace && reading.remaining_life < defaults::FEED_CRITICAL_RUL {
            debug!(unit_id, rul = reading.remaining_life, "[LiveFeed] Masking stale critical reading during grace window");
            healthy_placeholder(&reading, now)
        } else {
            live_payload(&reading)
        };

        self.state.remember_live_tick(&payload);
        Some(payload)
    }

    /// Serve one viewer until `cancel` fires or the sink closes.
    ///
    /// The first tick is sent immediately. The hub subscription is released
    /// on every exit path.
    pub async fn run_viewer<S: FeedSink>(
        &self,
        unit_id: &str,
        mut sink: S,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        let Subscription { id, mut rx } = self.hub.subscribe().await;
        debug!(unit_id, subscriber = %id, "[LiveFeed] Viewer connected");

        let result = self.viewer_loop(unit_id, &mut sink, &mut rx, &cancel).await;

        self.hub.unsubscribe(id).await;
        debug!(unit_id, subscriber = %id, "[LiveFeed] Viewer disconnected");
        match result {
            Err(FeedError::Closed) => Ok(()),
            other => other,
        }
    }

    async fn viewer_loop<S: FeedSink>(
        &self,
        unit_id: &str,
        sink: &mut S,
        rx: &mut mpsc::Receiver<FeedEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), FeedError> {
        let mut next_tick = Instant::now();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                event = rx.recv() => match event {
                    Some(event) => {
                        sink.send(&event).await?;
                        // Halt and resume change the cadence; don't sit out the old sleep.
                        if matches!(event, FeedEvent::Alert(_) | FeedEvent::SystemResumed(_)) {
                            next_tick = next_tick.min(Instant::now() + self.tick_interval().await);
                        }
                    }
                    None => return Ok(()),
                },
                () = tokio::time::sleep_until(next_tick) => {
                    if let Some(payload) = self.tick_payload(unit_id, Utc::now()).await {
                        sink.send(&FeedEvent::Telemetry(payload)).await?;
                    }
                    next_tick = Instant::now() + self.tick_interval().await;
                }
            }
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

fn halted_payload(snapshot: &Reading, downtime_seconds: f64) -> TelemetryPayload {
    TelemetryPayload {
        timestamp: snapshot.timestamp,
        unit_id: snapshot.unit_id.clone(),
        cycle: snapshot.cycle,
        rul: snapshot.remaining_life,
        vibration: snapshot.vibration,
        sensor_s11: snapshot.sensor_s11,
        unit_status: UnitStatus::Critical,
        is_error: true,
        system_halted: true,
        downtime_seconds: Some(downtime_seconds),
    }
}

fn live_payload(reading: &Reading) -> TelemetryPayload {
    let status = UnitStatus::for_live_tick(reading.remaining_life, reading.vibration);
    TelemetryPayload {
        timestamp: reading.timestamp,
        unit_id: reading.unit_id.clone(),
        cycle: reading.cycle,
        rul: reading.remaining_life,
        vibration: reading.vibration,
        sensor_s11: reading.sensor_s11,
        unit_status: status,
        is_error: status.is_critical(),
        system_halted: false,
        downtime_seconds: None,
    }
}

fn healthy_placeholder(reading: &Reading, now: DateTime<Utc>) -> TelemetryPayload {
    TelemetryPayload {
        timestamp: now,
        unit_id: reading.unit_id.clone(),
        cycle: reading.cycle,
        rul: defaults::HEALTHY_PLACEHOLDER_RUL,
        vibration: defaults::HEALTHY_PLACEHOLDER_VIBRATION,
        sensor_s11: Some(defaults::HEALTHY_PLACEHOLDER_S11),
        unit_status: UnitStatus::Healthy,
        is_error: false,
        system_halted: false,
        downtime_seconds: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemoryTelemetrySource;
    use crate::types::ResumeNotice;

    fn reading(unit: &str, rul: f64, vibration: f64) -> Reading {
        Reading {
            unit_id: unit.to_string(),
            cycle: 77,
            remaining_life: rul,
            vibration,
            sensor_s11: Some(40.0),
            timestamp: Utc::now(),
        }
    }

    async fn feed_with(r: Reading) -> (LiveFeed, Arc<TwinState>, Arc<MemoryTelemetrySource>) {
        let state = Arc::new(TwinState::new(Duration::from_secs(30)));
        let telemetry = Arc::new(MemoryTelemetrySource::new());
        telemetry.push(r).await;
        let feed = LiveFeed::new(
            Arc::clone(&state),
            telemetry.clone(),
            Arc::new(BroadcastHub::new(16)),
            FeedConfig::default(),
            Duration::from_secs(1),
        );
        (feed, state, telemetry)
    }

    #[tokio::test]
    async fn test_live_tick_classification() {
        let (feed, state, telemetry) = feed_with(reading("ENGINE-001", 50.0, 0.1)).await;
        let p = feed.tick_payload("ENGINE-001", Utc::now()).await.unwrap();
        assert_eq!(p.unit_status, UnitStatus::Healthy);
        assert!(!p.is_error);
        assert!(state.last_live_tick().is_some());

        telemetry.push(reading("ENGINE-001", 50.0, 0.4)).await;
        let p = feed.tick_payload("ENGINE-001", Utc::now()).await.unwrap();
        assert_eq!(p.unit_status, UnitStatus::Critical);
        assert!(p.is_error);

        telemetry.push(reading("ENGINE-001", 7.0, 0.1)).await;
        let p = feed.tick_payload("ENGINE-001", Utc::now()).await.unwrap();
        assert_eq!(p.unit_status, UnitStatus::Warning);
    }

    #[tokio::test]
    async fn test_halted_tick_serves_snapshot_to_every_viewer() {
        let (feed, state, _) = feed_with(reading("ENGINE-002", 80.0, 0.1)).await;
        let t0 = Utc::now();
        state
            .halt
            .trigger_failure_at(reading("ENGINE-001", 0.0, 0.25), t0)
            .await
            .unwrap();

        let p = feed
            .tick_payload("ENGINE-002", t0 + chrono::Duration::milliseconds(4200))
            .await
            .unwrap();
        assert_eq!(p.unit_id, "ENGINE-001");
        assert_eq!(p.rul, 0.0);
        assert!(p.system_halted);
        assert!(p.is_error);
        assert_eq!(p.downtime_seconds, Some(4.2));
        assert_eq!(feed.tick_interval().await, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_grace_window_masks_stale_failure() {
        let (feed, state, _) = feed_with(reading("ENGINE-001", 0.0, 0.25)).await;
        let t0 = Utc::now();
        state.halt.trigger_failure_at(reading("ENGINE-001", 0.0, 0.25), t0).await.unwrap();
        let resumed_at = t0 + chrono::Duration::seconds(10);
        state.halt.resume_at(resumed_at).await;

        let p = feed
            .tick_payload("ENGINE-001", resumed_at + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(p.rul, 125.0);
        assert_eq!(p.vibration, 0.115);
        assert_eq!(p.sensor_s11, Some(23.0));
        assert_eq!(p.cycle, 77);
        assert_eq!(p.unit_status, UnitStatus::Healthy);

        let p = feed
            .tick_payload("ENGINE-001", resumed_at + chrono::Duration::seconds(31))
            .await
            .unwrap();
        assert_eq!(p.rul, 0.0);
        assert_eq!(p.unit_status, UnitStatus::Critical);
    }

    #[tokio::test]
    async fn test_store_error_skips_tick() {
        let (feed, _, telemetry) = feed_with(reading("ENGINE-001", 50.0, 0.1)).await;
        telemetry.set_unavailable(true);
        assert!(feed.tick_payload("ENGINE-001", Utc::now()).await.is_none());
        assert!(feed.tick_payload("ENGINE-404", Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_viewer_gets_first_tick_and_broadcasts_then_unsubscribes() {
        let (feed, _, _) = feed_with(reading("ENGINE-001", 50.0, 0.1)).await;
        let feed = Arc::new(feed);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = {
            let feed = Arc::clone(&feed);
            let cancel = cancel.clone();
            tokio::spawn(async move { feed.run_viewer("ENGINE-001", tx, cancel).await })
        };

        match rx.recv().await {
            Some(FeedEvent::Telemetry(p)) => assert_eq!(p.unit_id, "ENGINE-001"),
            other => panic!("expected first tick, got {other:?}"),
        }

        let notice = FeedEvent::SystemResumed(ResumeNotice {
            downtime_seconds: 3.0,
            timestamp: Utc::now(),
        });
        assert_eq!(feed.hub().broadcast(&notice).await.delivered, 1);
        assert_eq!(rx.recv().await, Some(notice));

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(feed.hub().subscriber_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_pulls_first_halted_tick_forward() {
        let (feed, state, _) = feed_with(reading("ENGINE-001", 50.0, 0.1)).await;
        let feed = Arc::new(feed);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = {
            let feed = Arc::clone(&feed);
            let cancel = cancel.clone();
            tokio::spawn(async move { feed.run_viewer("ENGINE-001", tx, cancel).await })
        };
        assert!(matches!(rx.recv().await, Some(FeedEvent::Telemetry(_))));

        // Live cadence is 5 s; the halted one is 2 s.
        state.halt.trigger_failure(reading("ENGINE-001", 0.0, 0.25)).await.unwrap();
        let alert = FeedEvent::Alert(crate::types::AlertEvent {
            severity: "critical".to_string(),
            is_error: true,
            unit_id: "ENGINE-001".to_string(),
            rul: 0.0,
            vibration: 0.25,
            cycle: Some(77),
            message: "failure".to_string(),
            timestamp: Utc::now(),
        });
        feed.hub().broadcast(&alert).await;
        assert_eq!(rx.recv().await, Some(alert));

        match tokio::time::timeout(Duration::from_millis(2500), rx.recv()).await {
            Ok(Some(FeedEvent::Telemetry(p))) => {
                assert!(p.system_halted);
                assert_eq!(p.rul, 0.0);
            }
            other => panic!("expected halted tick within the halted cadence, got {other:?}"),
        }

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
