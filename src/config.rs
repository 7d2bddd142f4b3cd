// src/config.rs
//! Crate configuration, loaded from TOML with env overrides.
//!
//! Path resolution: $ARBITER_CONFIG_PATH → config/arbiter.toml → defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "ARBITER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/arbiter.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ArbiterConfig {
    /// Force-eviction window for a stalled processing lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Freshness window for incoming sightings.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
    /// Exempt livestreams from the age window.
    #[serde(default = "default_true")]
    pub ignore_age_for_live: bool,
    /// Refuse anything published before process start.
    #[serde(default)]
    pub freshness_floor_at_startup: bool,
    /// Trust order, most trusted first.
    #[serde(default = "default_source_priority")]
    pub source_priority: Vec<String>,
    /// Durable record file; empty keeps records in memory only.
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// Listen address for the HTTP surface.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Discord webhook URL; may also come from $DISCORD_WEBHOOK_URL.
    #[serde(default)]
    pub discord_webhook: Option<String>,
}

fn default_lock_timeout_ms() -> u64 {
    crate::arbiter::DEFAULT_LOCK_TIMEOUT_MS
}

fn default_max_age_secs() -> i64 {
    6 * 3600
}

fn default_true() -> bool {
    true
}

fn default_source_priority() -> Vec<String> {
    crate::source_priority::DEFAULT_ORDER
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_state_path() -> String {
    crate::store::json_file::DEFAULT_STATE_PATH.to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config deserializes from defaults")
    }
}

impl ArbiterConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: ArbiterConfig = toml::from_str(s).context("parse arbiter config")?;
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Env-then-file-then-defaults resolution.
    pub fn load() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            return Self::from_path(&PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::from_path(&default);
        }
        let mut cfg = Self::default();
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ARBITER_LOCK_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.lock_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("ARBITER_MAX_AGE_SECS") {
            if let Ok(secs) = v.parse() {
                self.max_age_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !v.trim().is_empty() {
                self.discord_webhook = Some(v);
            }
        }
    }

    pub fn freshness(&self) -> crate::freshness::FreshnessPolicy {
        if self.freshness_floor_at_startup {
            crate::freshness::FreshnessPolicy {
                ignore_age_for_live: self.ignore_age_for_live,
                ..crate::freshness::FreshnessPolicy::since_startup(self.max_age_secs)
            }
        } else {
            crate::freshness::FreshnessPolicy {
                max_age_secs: self.max_age_secs,
                floor: None,
                ignore_age_for_live: self.ignore_age_for_live,
            }
        }
    }
}
