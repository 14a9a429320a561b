//! System-wide default constants.
//!
//! Centralises the numbers the dashboard protocol depends on. Operator-tunable
//! values are mirrored as fields in [`super::TwinConfig`]; the rest are fixed.

// ============================================================================
// Decision thresholds
// ============================================================================

/// Decision status: remaining life below this is CRITICAL.
pub const DECISION_CRITICAL_RUL: f64 = 3.0;

/// Decision status: remaining life below this is WARNING.
pub const DECISION_WARNING_RUL: f64 = 8.0;

/// Shadow rule: approve express shipping when remaining life is below this.
pub const SHADOW_APPROVE_RUL: f64 = 10.0;

/// Default express-shipping part cost (USD).
pub const DEFAULT_PART_COST: f64 = 350.0;

// ============================================================================
// Live feed
// ============================================================================

/// Live tick: remaining life below this is CRITICAL.
pub const FEED_CRITICAL_RUL: f64 = 1.0;

/// Live tick: vibration above this is CRITICAL (g RMS).
pub const FEED_CRITICAL_VIBRATION: f64 = 0.35;

/// Live tick: remaining life below this is WARNING.
pub const FEED_WARNING_RUL: f64 = 10.0;

/// Tick interval while live (seconds).
pub const LIVE_TICK_INTERVAL_SECS: u64 = 5;

/// Tick interval while halted (seconds). Faster so the downtime counter moves.
pub const HALTED_TICK_INTERVAL_SECS: u64 = 2;

/// Post-resume grace window (seconds).
pub const RESUME_GRACE_SECS: u64 = 30;

/// A unit is "active" when it reported within this window (seconds).
pub const UNIT_ACTIVE_WINDOW_SECS: i64 = 60;

/// Per-subscriber event queue capacity.
pub const SUBSCRIBER_BUFFER: usize = 64;

// ============================================================================
// Synthesized healthy payload (grace window)
// ============================================================================

/// Remaining life reported while the store catches up after a resume.
pub const HEALTHY_PLACEHOLDER_RUL: f64 = 125.0;

/// Vibration reported while the store catches up (C-MAPSS normal range).
pub const HEALTHY_PLACEHOLDER_VIBRATION: f64 = 0.115;

/// Raw S11 channel value reported while the store catches up.
pub const HEALTHY_PLACEHOLDER_S11: f64 = 23.0;

/// S11 value stamped on an injected failure snapshot.
pub const FAILURE_SNAPSHOT_S11: f64 = 50.0;

/// Store documents without a `vibration` field derive it as `|s11| * factor`.
pub const S11_VIBRATION_FACTOR: f64 = 0.005;

// ============================================================================
// Upstream
// ============================================================================

/// Deadline for a single telemetry/personnel store request (seconds).
pub const STORE_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Deadline for a conversational responder request (seconds).
pub const RESPONDER_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Cost comparison (annual fleet figures)
// ============================================================================

/// Average cost per unplanned failure (parts + downtime + labor).
pub const COST_REACTIVE: f64 = 18_500.0;

/// Scheduled maintenance per event.
pub const COST_PREVENTIVE: f64 = 7_200.0;

/// Just-in-time, policy-optimised swap.
pub const COST_PREDICTIVE: f64 = 2_800.0;

pub const DOWNTIME_REACTIVE_HR: f64 = 48.0;
pub const DOWNTIME_PREVENTIVE_HR: f64 = 8.0;
pub const DOWNTIME_PREDICTIVE_HR: f64 = 2.0;

/// Estimated production loss per hour of downtime (USD), used in chat replies.
pub const PRODUCTION_LOSS_PER_HOUR: f64 = 1_250.0;

/// Dataset note carried on every decision's metrics block.
pub const DATA_VOLUME_NOTE: &str = "20,000+ rows (NASA C-MAPSS FD001)";
