//! Auto-Trigger - background poller for end-of-life readings
//!
//! After a startup delay, polls the telemetry store on a fixed interval for
//! readings with RUL below 1 inside the lookback window. The first critical
//! reading of each unit runs the failure-injection flow; the unit is then
//! remembered until the next resume clears the alerted set.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::{cycle_label, FailureInjection, IncidentCoordinator};
use super::state::TwinState;
use crate::config::AutoTriggerConfig;
use crate::sources::{with_deadline, TelemetrySource};
use crate::types::Reading;

pub struct AutoTrigger {
    state: Arc<TwinState>,
    telemetry: Arc<dyn TelemetrySource>,
    coordinator: Arc<IncidentCoordinator>,
    config: AutoTriggerConfig,
    request_timeout: Duration,
}

impl AutoTrigger {
    pub fn new(
        state: Arc<TwinState>,
        telemetry: Arc<dyn TelemetrySource>,
        coordinator: Arc<IncidentCoordinator>,
        config: AutoTriggerConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            state,
            telemetry,
            coordinator,
            config,
            request_timeout,
        }
    }

    /// Poll until `cancel` fires (call from tokio::spawn).
    pub async fn run(self, cancel: CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(Duration::from_secs(self.config.initial_delay_secs)) => {}
        }
        info!(
            interval_secs = self.config.interval_secs,
            lookback_secs = self.config.lookback_secs,
            "[AutoTrigger] Poller started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let fired = self.poll_once().await;
                    if fired > 0 {
                        info!(fired, "[AutoTrigger] Autonomous failure flows started");
                    }
                }
            }
        }
        info!("[AutoTrigger] Poller stopped");
    }

    /// One poll. Returns the number of units that triggered.
    pub async fn poll_once(&self) -> usize {
        let lookback = Duration::from_secs(self.config.lookback_secs);
        let critical = match with_deadline(self.request_timeout, self.telemetry.recent_critical(lookback)).await {
            Ok(readings) => readings,
            Err(e) => {
                warn!(error = %e, "[AutoTrigger] Critical-reading query failed");
                return 0;
            }
        };

        let mut fired = 0;
        for reading in critical {
            if !self.state.halt.mark_alerted(&reading.unit_id).await {
                debug!(unit_id = %reading.unit_id, "[AutoTrigger] Unit already alerted, skipping");
                continue;
            }
            info!(unit_id = %reading.unit_id, cycle = reading.cycle, "[AutoTrigger] RUL=0 detected, triggering failure flow");
            match self.coordinator.inject_failure(autonomous_injection(&reading)).await {
                Ok(_) => fired += 1,
                Err(e) => warn!(unit_id = %reading.unit_id, error = %e, "[AutoTrigger] Failure flow rejected"),
            }
        }
        fired
    }
}

fn autonomous_injection(reading: &Reading) -> FailureInjection {
    let cycle = Some(reading.cycle);
    FailureInjection {
        unit_id: reading.unit_id.clone(),
        rul: reading.remaining_life,
        vibration: reading.vibration,
        cycle,
        message: Some(format!(
            "⚠️ AUTONOMOUS ACTION — {} has reached RUL=0. System auto-initiated orchestration. Cycle: {} | Vibration: {} g",
            reading.unit_id,
            cycle_label(cycle),
            reading.vibration
        )),
    }
}
