//! Telemetry, personnel and unit-activity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::defaults;

// ============================================================================
// Unit Status
// ============================================================================

/// Health classification shared by decisions and live ticks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
}

impl UnitStatus {
    /// Decision status: a pure function of remaining life.
    ///
    /// `rul < 3` is CRITICAL, `rul < 8` is WARNING, everything else HEALTHY.
    pub fn for_decision(remaining_life: f64) -> Self {
        if remaining_life < defaults::DECISION_CRITICAL_RUL {
            Self::Critical
        } else if remaining_life < defaults::DECISION_WARNING_RUL {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    /// Live-tick status. Vibration can escalate a healthy RUL to CRITICAL.
    pub fn for_live_tick(remaining_life: f64, vibration: f64) -> Self {
        if remaining_life < defaults::FEED_CRITICAL_RUL
            || vibration > defaults::FEED_CRITICAL_VIBRATION
        {
            Self::Critical
        } else if remaining_life < defaults::FEED_WARNING_RUL {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub fn is_critical(self) -> bool {
        matches!(self, Self::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Reading
// ============================================================================

/// One telemetry sample for an engine unit. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub unit_id: String,
    pub cycle: u64,
    /// Remaining useful life, in cycles.
    pub remaining_life: f64,
    /// Vibration in g RMS.
    pub vibration: f64,
    /// Raw C-MAPSS sensor 11 channel the vibration figure is derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_s11: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// True when every numeric field is finite and non-negative.
    pub fn is_well_formed(&self) -> bool {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        finite_non_negative(self.remaining_life)
            && finite_non_negative(self.vibration)
            && self.sensor_s11.map_or(true, f64::is_finite)
    }
}

// ============================================================================
// Personnel
// ============================================================================

/// On-duty technician status, one per lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonnelStatus {
    pub technician_name: String,
    pub available: bool,
    pub hours_until_shift_end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// ============================================================================
// State Vector
// ============================================================================

/// Policy input: exactly `[remaining_life, vibration, hours_until_shift_end, part_cost]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct StateVector([f64; 4]);

impl StateVector {
    pub fn new(remaining_life: f64, vibration: f64, hours_until_shift_end: f64, part_cost: f64) -> Self {
        Self([remaining_life, vibration, hours_until_shift_end, part_cost])
    }

    pub fn from_inputs(reading: &Reading, personnel: &PersonnelStatus, part_cost: f64) -> Self {
        Self::new(
            reading.remaining_life,
            reading.vibration,
            personnel.hours_until_shift_end,
            part_cost,
        )
    }

    pub fn remaining_life(&self) -> f64 {
        self.0[0]
    }

    pub fn hours_until_shift_end(&self) -> f64 {
        self.0[2]
    }

    pub fn part_cost(&self) -> f64 {
        self.0[3]
    }

    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }
}

// ============================================================================
// Unit Activity
// ============================================================================

/// Per-unit aggregate as reported by the telemetry store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitActivity {
    pub unit_id: String,
    pub doc_count: u64,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_remaining_life: Option<f64>,
    pub last_cycle: Option<u64>,
}

/// Unit picker entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitSummary {
    pub unit_id: String,
    pub doc_count: u64,
    pub last_seen: Option<DateTime<Utc>>,
    pub active: bool,
    pub rul: Option<f64>,
    pub cycle: Option<u64>,
}

/// Mark units active when seen within `active_window_secs` of `now`, then
/// order active units first and by document count descending.
pub fn rank_units(
    activity: Vec<UnitActivity>,
    now: DateTime<Utc>,
    active_window_secs: i64,
) -> Vec<UnitSummary> {
    let mut units: Vec<UnitSummary> = activity
        .into_iter()
        .map(|a| {
            let active = a
                .last_seen
                .is_some_and(|seen| (now - seen).num_seconds() < active_window_secs);
            UnitSummary {
                unit_id: a.unit_id,
                doc_count: a.doc_count,
                last_seen: a.last_seen,
                active,
                rul: a.last_remaining_life,
                cycle: a.last_cycle,
            }
        })
        .collect();

    units.sort_by(|a, b| b.active.cmp(&a.active).then(b.doc_count.cmp(&a.doc_count)));
    units
}
