//! In-memory collaborators
//!
//! Back the `--offline` demo mode and the test suite. Each source can be
//! switched to "unavailable" or given artificial latency to exercise the
//! degraded paths of the core.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{ConversationalResponder, PersonnelSource, SourceError, TelemetrySource};
use crate::config::defaults;
use crate::types::{PersonnelStatus, Reading, UnitActivity};

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Default)]
pub struct MemoryTelemetrySource {
    readings: RwLock<HashMap<String, Vec<Reading>>>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryTelemetrySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a healthy reading for each unit id.
    pub fn with_healthy_units(unit_ids: &[&str]) -> Self {
        let mut map = HashMap::new();
        for (i, id) in unit_ids.iter().enumerate() {
            map.insert(
                (*id).to_string(),
                vec![Reading {
                    unit_id: (*id).to_string(),
                    cycle: 1 + i as u64,
                    remaining_life: 120.0,
                    vibration: defaults::HEALTHY_PLACEHOLDER_VIBRATION,
                    sensor_s11: Some(defaults::HEALTHY_PLACEHOLDER_S11),
                    timestamp: Utc::now(),
                }],
            );
        }
        Self {
            readings: RwLock::new(map),
            ..Self::default()
        }
    }

    /// Append a reading; it becomes the latest for its unit.
    pub async fn push(&self, reading: Reading) {
        self.readings
            .write()
            .await
            .entry(reading.unit_id.clone())
            .or_default()
            .push(reading);
    }

    /// Simulate the store going away (every call returns `Unavailable`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    async fn gate(&self) -> Result<(), SourceError> {
        let latency = self.latency.lock().ok().and_then(|g| *g);
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("in-memory telemetry store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetrySource for MemoryTelemetrySource {
    async fn latest(&self, unit_id: &str) -> Result<Option<Reading>, SourceError> {
        self.gate().await?;
        Ok(self
            .readings
            .read()
            .await
            .get(unit_id)
            .and_then(|v| v.last())
            .cloned())
    }

    async fn list_units(&self) -> Result<Vec<UnitActivity>, SourceError> {
        self.gate().await?;
        let readings = self.readings.read().await;
        Ok(readings
            .iter()
            .map(|(id, rs)| {
                let last = rs.last();
                UnitActivity {
                    unit_id: id.clone(),
                    doc_count: rs.len() as u64,
                    last_seen: rs.iter().map(|r| r.timestamp).max(),
                    last_remaining_life: last.map(|r| r.remaining_life),
                    last_cycle: last.map(|r| r.cycle),
                }
            })
            .collect())
    }

    async fn recent_critical(&self, lookback: Duration) -> Result<Vec<Reading>, SourceError> {
        self.gate().await?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(lookback).unwrap_or_else(|_| chrono::Duration::zero());
        let readings = self.readings.read().await;
        let mut hits: Vec<Reading> = readings
            .values()
            .flatten()
            .filter(|r| r.remaining_life < defaults::FEED_CRITICAL_RUL && r.timestamp >= cutoff)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(hits)
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Personnel
// ============================================================================

pub struct MemoryPersonnelSource {
    roster: RwLock<HashMap<String, PersonnelStatus>>,
    unavailable: AtomicBool,
}

impl MemoryPersonnelSource {
    /// Roster with a single available technician.
    pub fn with_technician(name: &str, hours_until_shift_end: f64) -> Self {
        let mut roster = HashMap::new();
        roster.insert(
            name.to_string(),
            PersonnelStatus {
                technician_name: name.to_string(),
                available: true,
                hours_until_shift_end,
                location: Some("Bay 3 - Main Gantry".to_string()),
            },
        );
        Self {
            roster: RwLock::new(roster),
            unavailable: AtomicBool::new(false),
        }
    }

    pub async fn set_status(&self, status: PersonnelStatus) {
        self.roster
            .write()
            .await
            .insert(status.technician_name.clone(), status);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersonnelSource for MemoryPersonnelSource {
    async fn lookup(&self, technician: &str) -> Result<PersonnelStatus, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("in-memory personnel store offline".to_string()));
        }
        self.roster
            .read()
            .await
            .get(technician)
            .cloned()
            .ok_or_else(|| SourceError::Malformed(format!("no personnel record for {technician}")))
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Responder with a canned answer (or a canned failure). Records the last
/// context it was handed.
pub struct ScriptedResponder {
    reply: Option<String>,
    last_context: Mutex<Option<String>>,
}

impl ScriptedResponder {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            last_context: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            last_context: Mutex::new(None),
        }
    }

    pub fn last_context(&self) -> Option<String> {
        self.last_context.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl ConversationalResponder for ScriptedResponder {
    async fn reply(&self, context: &str, _message: &str) -> Result<String, SourceError> {
        if let Ok(mut guard) = self.last_context.lock() {
            *guard = Some(context.to_string());
        }
        self.reply
            .clone()
            .ok_or_else(|| SourceError::Unavailable("scripted responder failure".to_string()))
    }
}
