//! Twin Configuration - store endpoints, policy reward shape and feed timing
//!
//! Each struct implements `Default` with the values the dashboard protocol was
//! designed around, so the service behaves identically with no config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a twin deployment.
///
/// Load with `TwinConfig::load()` which searches:
/// 1. `$GANTRY_CONFIG` env var
/// 2. `./gantry.toml`
/// 3. Built-in defaults
///
/// Endpoint and secret environment variables are applied on top in every case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwinConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Telemetry / personnel document store
    #[serde(default)]
    pub elastic: ElasticConfig,

    /// Conversational responder (Agent Builder)
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Decision policy reward shape and part cost
    #[serde(default)]
    pub policy: PolicyConfig,

    /// On-duty technician lookup
    #[serde(default)]
    pub personnel: PersonnelConfig,

    /// Live feed timing
    #[serde(default)]
    pub feed: FeedConfig,

    /// Narrated orchestration
    #[serde(default)]
    pub narration: NarrationConfig,

    /// Background critical-reading poller
    #[serde(default)]
    pub auto_trigger: AutoTriggerConfig,
}

impl TwinConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_default();
        config.apply_env_overrides();
        config
    }

    fn load_file_or_default() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("GANTRY_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded twin config from GANTRY_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from GANTRY_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "GANTRY_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./gantry.toml
        let local = PathBuf::from("gantry.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded twin config from ./gantry.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./gantry.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No gantry.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Overlay endpoint and secret environment variables.
    ///
    /// These names match the `.env` files the deployment already ships with.
    pub fn apply_env_overrides(&mut self) {
        fn env(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(v) = env("GANTRY_SERVER_ADDR") {
            self.server.addr = v;
        }
        if let Some(v) = env("ELASTIC_ES_URL") {
            self.elastic.es_url = v;
        }
        if let Some(v) = env("ELASTIC_ES_API_KEY") {
            self.elastic.api_key = v;
        }
        if let Some(v) = env("ELASTIC_SIM_URL") {
            self.elastic.sim_url = v;
        }
        if let Some(v) = env("ELASTIC_SIM_API_KEY") {
            self.elastic.sim_api_key = v;
        }
        if let Some(v) = env("ELASTIC_KB_URL") {
            self.assistant.kb_url = v;
        }
        if let Some(v) = env("ELASTIC_CONVERSE_API_KEY") {
            self.assistant.api_key = v;
        }
        if let Some(v) = env("ELASTIC_AGENT_ID") {
            self.assistant.agent_id = v;
        }
    }

    /// Validate values for internal consistency.
    ///
    /// All problems are collected so an operator sees every bad key at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let p = &self.policy;
        for (name, value) in [
            ("policy.part_cost", p.part_cost),
            ("policy.express_bonus", p.express_bonus),
            ("policy.late_install_penalty", p.late_install_penalty),
            ("policy.veto_bonus", p.veto_bonus),
            ("policy.failure_penalty", p.failure_penalty),
            ("policy.min_install_hours", p.min_install_hours),
            ("policy.min_safe_rul", p.min_safe_rul),
        ] {
            if !value.is_finite() || value < 0.0 {
                errors.push(format!("{name} must be a finite, non-negative number (got {value})"));
            }
        }

        let f = &self.feed;
        if f.live_interval_secs == 0 {
            errors.push("feed.live_interval_secs must be > 0".to_string());
        }
        if f.halted_interval_secs == 0 {
            errors.push("feed.halted_interval_secs must be > 0".to_string());
        }
        if f.subscriber_buffer == 0 {
            errors.push("feed.subscriber_buffer must be > 0".to_string());
        }
        if f.active_window_secs <= 0 {
            errors.push("feed.active_window_secs must be > 0".to_string());
        }

        if self.elastic.request_timeout_secs == 0 {
            errors.push("elastic.request_timeout_secs must be > 0".to_string());
        }
        if self.elastic.telemetry_index.trim().is_empty() {
            errors.push("elastic.telemetry_index must not be empty".to_string());
        }
        if self.assistant.timeout_secs == 0 {
            errors.push("assistant.timeout_secs must be > 0".to_string());
        }

        let per = &self.personnel;
        if per.technician.trim().is_empty() {
            errors.push("personnel.technician must not be empty".to_string());
        }
        if !per.fallback_shift_hours.is_finite() || per.fallback_shift_hours < 0.0 {
            errors.push(format!(
                "personnel.fallback_shift_hours must be a finite, non-negative number (got {})",
                per.fallback_shift_hours
            ));
        }

        if self.auto_trigger.enabled && self.auto_trigger.interval_secs == 0 {
            errors.push("auto_trigger.interval_secs must be > 0 when enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Config validation failed:")?;
                for e in errors {
                    write!(f, "\n  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Server Config
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `GANTRY_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

// ============================================================================
// Elastic Config
// ============================================================================

/// Document store endpoints. Empty URL or key means "not configured".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    #[serde(default)]
    pub es_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Secondary cluster the simulator may be writing to; tried after `es_url`.
    #[serde(default)]
    pub sim_url: String,
    #[serde(default)]
    pub sim_api_key: String,
    #[serde(default = "default_telemetry_index")]
    pub telemetry_index: String,
    #[serde(default = "default_personnel_index")]
    pub personnel_index: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_telemetry_index() -> String { "gantry_telemetry".to_string() }
fn default_personnel_index() -> String { "gantry_personnel".to_string() }
fn default_request_timeout_secs() -> u64 { defaults::STORE_REQUEST_TIMEOUT_SECS }

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            es_url: String::new(),
            api_key: String::new(),
            sim_url: String::new(),
            sim_api_key: String::new(),
            telemetry_index: default_telemetry_index(),
            personnel_index: default_personnel_index(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ElasticConfig {
    pub fn is_configured(&self) -> bool {
        !self.es_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Assistant Config
// ============================================================================

/// Agent Builder `/converse` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub kb_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default = "default_responder_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_agent_id() -> String { "gantry_orchestrator".to_string() }
fn default_responder_timeout_secs() -> u64 { defaults::RESPONDER_TIMEOUT_SECS }

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            kb_url: String::new(),
            api_key: String::new(),
            agent_id: default_agent_id(),
            timeout_secs: default_responder_timeout_secs(),
        }
    }
}

impl AssistantConfig {
    pub fn is_configured(&self) -> bool {
        !self.kb_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

// ============================================================================
// Policy Config
// ============================================================================

/// Reward shape of the single-step shipping environment the policy optimises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Express-shipping part cost; also the fourth state-vector component.
    #[serde(default = "default_part_cost")]
    pub part_cost: f64,
    /// Reward for an express part arriving while the technician can install it.
    #[serde(default = "default_express_bonus")]
    pub express_bonus: f64,
    /// Penalty for an express part arriving after the shift window closes.
    #[serde(default = "default_late_install_penalty")]
    pub late_install_penalty: f64,
    /// Reward for standard shipping while the engine still has runway.
    #[serde(default = "default_veto_bonus")]
    pub veto_bonus: f64,
    /// Penalty for standard shipping on an engine about to fail.
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: f64,
    /// Shift hours strictly above which an express install is feasible.
    #[serde(default = "default_min_install_hours")]
    pub min_install_hours: f64,
    /// Remaining life strictly above which standard shipping is safe.
    #[serde(default = "default_min_safe_rul")]
    pub min_safe_rul: f64,
}

fn default_part_cost() -> f64 { defaults::DEFAULT_PART_COST }
fn default_express_bonus() -> f64 { 1000.0 }
fn default_late_install_penalty() -> f64 { 500.0 }
fn default_veto_bonus() -> f64 { 500.0 }
fn default_failure_penalty() -> f64 { 2000.0 }
fn default_min_install_hours() -> f64 { 2.0 }
fn default_min_safe_rul() -> f64 { 2.0 }

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            part_cost: default_part_cost(),
            express_bonus: default_express_bonus(),
            late_install_penalty: default_late_install_penalty(),
            veto_bonus: default_veto_bonus(),
            failure_penalty: default_failure_penalty(),
            min_install_hours: default_min_install_hours(),
            min_safe_rul: default_min_safe_rul(),
        }
    }
}

// ============================================================================
// Personnel Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonnelConfig {
    /// On-duty technician looked up for every orchestration cycle.
    #[serde(default = "default_technician")]
    pub technician: String,
    /// Shift hours assumed when the personnel record carries none.
    #[serde(default = "default_fallback_shift_hours")]
    pub fallback_shift_hours: f64,
}

fn default_technician() -> String { "Soufiane".to_string() }
fn default_fallback_shift_hours() -> f64 { 4.0 }

impl Default for PersonnelConfig {
    fn default() -> Self {
        Self {
            technician: default_technician(),
            fallback_shift_hours: default_fallback_shift_hours(),
        }
    }
}

// ============================================================================
// Feed Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_live_interval_secs")]
    pub live_interval_secs: u64,
    #[serde(default = "default_halted_interval_secs")]
    pub halted_interval_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    #[serde(default = "default_active_window_secs")]
    pub active_window_secs: i64,
}

fn default_live_interval_secs() -> u64 { defaults::LIVE_TICK_INTERVAL_SECS }
fn default_halted_interval_secs() -> u64 { defaults::HALTED_TICK_INTERVAL_SECS }
fn default_grace_secs() -> u64 { defaults::RESUME_GRACE_SECS }
fn default_subscriber_buffer() -> usize { defaults::SUBSCRIBER_BUFFER }
fn default_active_window_secs() -> i64 { defaults::UNIT_ACTIVE_WINDOW_SECS }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            live_interval_secs: default_live_interval_secs(),
            halted_interval_secs: default_halted_interval_secs(),
            grace_secs: default_grace_secs(),
            subscriber_buffer: default_subscriber_buffer(),
            active_window_secs: default_active_window_secs(),
        }
    }
}

// ============================================================================
// Narration Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    /// Sleep between narrated steps. Disable for headless runs.
    #[serde(default = "default_pacing_enabled")]
    pub pacing_enabled: bool,
}

fn default_pacing_enabled() -> bool { true }

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            pacing_enabled: default_pacing_enabled(),
        }
    }
}

// ============================================================================
// Auto-Trigger Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTriggerConfig {
    /// Off by default: failures normally arrive through the injection endpoint.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_trigger_interval_secs")]
    pub interval_secs: u64,
    /// How far back a critical reading still counts as new.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
}

fn default_initial_delay_secs() -> u64 { 10 }
fn default_trigger_interval_secs() -> u64 { 30 }
fn default_lookback_secs() -> u64 { 120 }

impl Default for AutoTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_secs: default_initial_delay_secs(),
            interval_secs: default_trigger_interval_secs(),
            lookback_secs: default_lookback_secs(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = TwinConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: TwinConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.server.addr, "0.0.0.0:8000");
        assert_eq!(config.policy.part_cost, 350.0);
        assert_eq!(config.feed.live_interval_secs, 5);
        assert_eq!(config.feed.halted_interval_secs, 2);
        assert_eq!(config.feed.grace_secs, 30);
        assert_eq!(config.personnel.technician, "Soufiane");
        assert!(!config.auto_trigger.enabled);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[policy]
part_cost = 420.0

[feed]
grace_secs = 45
"#;
        let config: TwinConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.policy.part_cost, 420.0);
        assert_eq!(config.feed.grace_secs, 45);
        // Untouched keys keep defaults
        assert_eq!(config.policy.express_bonus, 1000.0);
        assert_eq!(config.feed.live_interval_secs, 5);
        assert_eq!(config.elastic.telemetry_index, "gantry_telemetry");
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = TwinConfig::default();
        config.policy.part_cost = -1.0;
        config.feed.live_interval_secs = 0;
        config.personnel.technician = "  ".to_string();
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3, "got {errors:?}");
                assert!(errors.iter().any(|e| e.contains("policy.part_cost")));
                assert!(errors.iter().any(|e| e.contains("feed.live_interval_secs")));
                assert!(errors.iter().any(|e| e.contains("personnel.technician")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_nan_cost() {
        let mut config = TwinConfig::default();
        config.policy.part_cost = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = TwinConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let back: TwinConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original.policy.part_cost, back.policy.part_cost);
        assert_eq!(original.feed.grace_secs, back.feed.grace_secs);
    }

    #[test]
    fn test_unconfigured_endpoints() {
        let config = TwinConfig::default();
        assert!(!config.elastic.is_configured());
        assert!(!config.assistant.is_configured());
    }
}
