//! Elasticsearch-backed telemetry and personnel sources
//!
//! Talks to the `_search` endpoint directly over `reqwest`. Telemetry lookups
//! try the primary cluster first and then the simulator cluster, which may be
//! a separate deployment the data streamer writes to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{PersonnelSource, SourceError, TelemetrySource};
use crate::config::{defaults, ElasticConfig};
use crate::types::{PersonnelStatus, Reading, UnitActivity};

/// Maximum number of unit buckets returned to the unit picker.
const MAX_UNIT_BUCKETS: u32 = 100;

/// Maximum critical readings inspected per poll.
const MAX_CRITICAL_HITS: u32 = 5;

// ============================================================================
// HTTP Client
// ============================================================================

/// Thin client for one Elasticsearch cluster.
#[derive(Clone)]
pub struct ElasticClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ElasticClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `/{index}/_search` and return the decoded response.
    pub async fn search(&self, index: &str, body: &Value) -> Result<Value, SourceError> {
        let resp = self
            .http
            .post(format!("{}/{}/_search", self.base_url, index))
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }
        resp.json::<Value>().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else {
            SourceError::Http(err)
        }
    }
}

/// One searchable cluster. Lets the cross-cluster lookup run against fakes.
#[async_trait]
pub trait SearchCluster: Send + Sync {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, SourceError>;

    fn name(&self) -> &str;
}

#[async_trait]
impl SearchCluster for ElasticClient {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, SourceError> {
        ElasticClient::search(self, index, body).await
    }

    fn name(&self) -> &str {
        self.base_url()
    }
}

fn hits(response: &Value) -> &[Value] {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

// ============================================================================
// Document Parsing
// ============================================================================

/// Parse a `gantry_telemetry` document into a [`Reading`].
///
/// `rul_label` is required. Documents without `vibration` derive it from
/// sensor 11 as `|s11| * 0.005`.
pub fn parse_telemetry_doc(doc: &Value, fallback_unit: &str) -> Result<Reading, SourceError> {
    let remaining_life = doc
        .get("rul_label")
        .and_then(Value::as_f64)
        .ok_or_else(|| SourceError::Malformed("telemetry document has no numeric rul_label".to_string()))?;

    let sensor_s11 = doc.get("sensor_measure_11").and_then(Value::as_f64);
    let vibration = doc
        .get("vibration")
        .and_then(Value::as_f64)
        .unwrap_or_else(|| sensor_s11.unwrap_or(0.0).abs() * defaults::S11_VIBRATION_FACTOR);

    let timestamp = doc
        .get("@timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |t| t.with_timezone(&Utc));

    let reading = Reading {
        unit_id: doc
            .get("unit_id")
            .and_then(Value::as_str)
            .unwrap_or(fallback_unit)
            .to_string(),
        cycle: doc.get("cycle").and_then(Value::as_u64).unwrap_or(0),
        remaining_life,
        vibration,
        sensor_s11,
        timestamp,
    };

    if !reading.is_well_formed() {
        return Err(SourceError::Malformed(format!(
            "telemetry values out of range (rul={}, vibration={})",
            reading.remaining_life, reading.vibration
        )));
    }
    Ok(reading)
}

/// Parse a `gantry_personnel` document.
///
/// Records without `hours_until_shift_end` get `fallback_shift_hours`.
pub fn parse_personnel_doc(
    doc: &Value,
    technician: &str,
    fallback_shift_hours: f64,
) -> Result<PersonnelStatus, SourceError> {
    let status = doc
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| SourceError::Malformed(format!("personnel record for {technician} has no status")))?;

    let hours_until_shift_end = doc
        .get("hours_until_shift_end")
        .and_then(Value::as_f64)
        .filter(|h| h.is_finite() && *h >= 0.0)
        .unwrap_or(fallback_shift_hours);

    Ok(PersonnelStatus {
        technician_name: doc
            .get("tech_name")
            .and_then(Value::as_str)
            .unwrap_or(technician)
            .to_string(),
        available: status.trim().eq_ignore_ascii_case("available"),
        hours_until_shift_end,
        location: doc.get("location").and_then(Value::as_str).map(str::to_string),
    })
}

/// Personnel status from a `_search` response.
///
/// A technician with no record is reported unavailable with the fallback
/// shift window, so a roster gap never blocks a decision.
pub fn personnel_from_response(
    response: &Value,
    technician: &str,
    fallback_shift_hours: f64,
) -> Result<PersonnelStatus, SourceError> {
    match hits(response).first().and_then(|h| h.get("_source")) {
        Some(source) => parse_personnel_doc(source, technician, fallback_shift_hours),
        None => {
            warn!(technician, fallback_shift_hours, "[Elastic] No personnel record, using fallback shift window");
            Ok(PersonnelStatus {
                technician_name: technician.to_string(),
                available: false,
                hours_until_shift_end: fallback_shift_hours,
                location: None,
            })
        }
    }
}

/// Parse the `units` terms aggregation into per-unit activity.
pub fn parse_unit_buckets(response: &Value) -> Vec<UnitActivity> {
    let Some(buckets) = response
        .pointer("/aggregations/units/buckets")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    buckets
        .iter()
        .filter_map(|b| {
            let unit_id = b.get("key").and_then(Value::as_str)?.to_string();
            #[allow(clippy::cast_possible_truncation)]
            let last_seen = b
                .pointer("/latest/value")
                .and_then(Value::as_f64)
                .and_then(|ms| DateTime::from_timestamp_millis(ms as i64));
            let top = b.pointer("/latest_rul/hits/hits/0/_source");
            Some(UnitActivity {
                unit_id,
                doc_count: b.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                last_seen,
                last_remaining_life: top.and_then(|s| s.get("rul_label")).and_then(Value::as_f64),
                last_cycle: top.and_then(|s| s.get("cycle")).and_then(Value::as_u64),
            })
        })
        .collect()
}

// ============================================================================
// Telemetry Source
// ============================================================================

/// Latest reading for `unit_id`, asking each cluster in order.
///
/// The first hit wins. A miss or an error moves on to the next cluster.
/// Errors only surface when no cluster answered at all.
pub async fn latest_across<C: SearchCluster>(
    clusters: &[C],
    index: &str,
    unit_id: &str,
) -> Result<Option<Reading>, SourceError> {
    let query = json!({
        "size": 1,
        "sort": [{"@timestamp": "desc"}],
        "query": {"match": {"unit_id": unit_id}},
    });

    let mut last_err = None;
    let mut any_answered = false;
    for cluster in clusters {
        match cluster.search(index, &query).await {
            Ok(resp) => {
                any_answered = true;
                if let Some(hit) = hits(&resp).first() {
                    let Some(source) = hit.get("_source") else {
                        return Err(SourceError::Malformed("search hit has no _source".to_string()));
                    };
                    return parse_telemetry_doc(source, unit_id).map(Some);
                }
                debug!(unit_id, cluster = cluster.name(), "[Elastic] No telemetry on cluster");
            }
            Err(e) => {
                warn!(unit_id, cluster = cluster.name(), error = %e, "[Elastic] Telemetry query failed");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) if !any_answered => Err(e),
        _ => Ok(None),
    }
}

pub struct ElasticTelemetrySource {
    /// Primary cluster first, simulator cluster (if distinct) second.
    clusters: Vec<ElasticClient>,
    index: String,
}

impl ElasticTelemetrySource {
    pub fn from_config(config: &ElasticConfig) -> Result<Self, SourceError> {
        if !config.is_configured() {
            return Err(SourceError::NotConfigured("elastic.es_url / elastic.api_key"));
        }
        let timeout = config.request_timeout();
        let mut clusters = vec![ElasticClient::new(&config.es_url, &config.api_key, timeout)?];

        let sim_url = config.sim_url.trim();
        if !sim_url.is_empty() && sim_url != config.es_url.trim() {
            let key = if config.sim_api_key.trim().is_empty() {
                &config.api_key
            } else {
                &config.sim_api_key
            };
            clusters.push(ElasticClient::new(sim_url, key, timeout)?);
        }

        Ok(Self {
            clusters,
            index: config.telemetry_index.clone(),
        })
    }

    fn primary(&self) -> &ElasticClient {
        &self.clusters[0]
    }
}

#[async_trait]
impl TelemetrySource for ElasticTelemetrySource {
    async fn latest(&self, unit_id: &str) -> Result<Option<Reading>, SourceError> {
        latest_across(self.clusters.as_slice(), &self.index, unit_id).await
    }

    async fn list_units(&self) -> Result<Vec<UnitActivity>, SourceError> {
        let query = json!({
            "size": 0,
            "aggs": {
                "units": {
                    "terms": {"field": "unit_id.keyword", "size": MAX_UNIT_BUCKETS},
                    "aggs": {
                        "latest": {"max": {"field": "@timestamp"}},
                        "latest_rul": {
                            "top_hits": {
                                "size": 1,
                                "sort": [{"@timestamp": "desc"}],
                                "_source": ["rul_label", "cycle"],
                            }
                        },
                    },
                }
            },
        });
        let resp = self.primary().search(&self.index, &query).await?;
        Ok(parse_unit_buckets(&resp))
    }

    async fn recent_critical(&self, lookback: Duration) -> Result<Vec<Reading>, SourceError> {
        let query = json!({
            "size": MAX_CRITICAL_HITS,
            "sort": [{"@timestamp": "desc"}],
            "query": {
                "bool": {
                    "must": [{"term": {"rul_label": 0}}],
                    "filter": [{"range": {"@timestamp": {"gte": format!("now-{}s", lookback.as_secs())}}}],
                }
            },
        });
        let resp = self.primary().search(&self.index, &query).await?;

        Ok(hits(&resp)
            .iter()
            .filter_map(|hit| {
                let source = hit.get("_source")?;
                match parse_telemetry_doc(source, "UNKNOWN") {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!(error = %e, "[Elastic] Skipping malformed critical reading");
                        None
                    }
                }
            })
            .collect())
    }

    fn source_name(&self) -> &str {
        "elasticsearch"
    }
}

// ============================================================================
// Personnel Source
// ============================================================================

pub struct ElasticPersonnelSource {
    client: ElasticClient,
    index: String,
    fallback_shift_hours: f64,
}

impl ElasticPersonnelSource {
    pub fn from_config(config: &ElasticConfig, fallback_shift_hours: f64) -> Result<Self, SourceError> {
        if !config.is_configured() {
            return Err(SourceError::NotConfigured("elastic.es_url / elastic.api_key"));
        }
        Ok(Self {
            client: ElasticClient::new(&config.es_url, &config.api_key, config.request_timeout())?,
            index: config.personnel_index.clone(),
            fallback_shift_hours,
        })
    }
}

#[async_trait]
impl PersonnelSource for ElasticPersonnelSource {
    async fn lookup(&self, technician: &str) -> Result<PersonnelStatus, SourceError> {
        let query = json!({
            "size": 1,
            "query": {"match": {"tech_name": technician}},
        });
        let resp = self.client.search(&self.index, &query).await?;
        personnel_from_response(&resp, technician, self.fallback_shift_hours)
    }
}
