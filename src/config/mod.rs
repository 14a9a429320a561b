//! Twin Configuration Module
//!
//! Per-deployment configuration loaded from TOML, replacing hardcoded
//! endpoints, timings and policy constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `GANTRY_CONFIG` environment variable (path to TOML file)
//! 2. `gantry.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Store and responder endpoints/secrets are then overlaid from the
//! environment (`ELASTIC_ES_URL`, `ELASTIC_ES_API_KEY`, ...), so existing
//! `.env` files keep working.

mod twin_config;
pub mod defaults;

pub use twin_config::*;
