//! Site configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mode::RuntimeMode;

/// Environment overrides understood by [`SiteConfig::apply_env`].
pub mod env_vars {
    /// Runtime mode (`development`, `test`, `production`).
    pub const MODE: &str = crate::mode::MODE_ENV_VAR;
    /// Public site URL.
    pub const APP_URL: &str = "SITEKIT_APP_URL";
    /// API base URL.
    pub const API_URL: &str = "SITEKIT_API_URL";
    /// Site display name.
    pub const APP_NAME: &str = "SITEKIT_APP_NAME";
    /// Analytics measurement ID.
    pub const ANALYTICS_ID: &str = "SITEKIT_GA_ID";
}

/// Top-level site configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Site version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Short description used in page metadata.
    #[serde(default)]
    pub description: String,

    /// Public URL of the site.
    #[serde(default = "default_url")]
    pub url: String,

    /// Base URL of the backing API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Runtime mode.
    #[serde(default)]
    pub mode: RuntimeMode,

    /// Defaults for the query cache.
    #[serde(default)]
    pub query: QueryDefaults,

    /// Analytics settings.
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

fn default_name() -> String {
    "SiteKit Starter".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            description: String::new(),
            url: default_url(),
            api_url: default_api_url(),
            mode: RuntimeMode::default(),
            query: QueryDefaults::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Create a configuration with the given site name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Load config from a TOML or JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let config: Self = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        for warning in config.warnings() {
            tracing::warn!(path = %path.display(), "{}", warning);
        }

        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using a custom variable lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(env_vars::MODE) {
            self.mode = mode
                .parse()
                .with_context(|| format!("Invalid {}", env_vars::MODE))?;
        }
        if let Some(name) = lookup(env_vars::APP_NAME) {
            self.name = name;
        }
        if let Some(url) = lookup(env_vars::APP_URL) {
            self.url = url;
        }
        if let Some(api_url) = lookup(env_vars::API_URL) {
            self.api_url = api_url;
        }
        if let Some(id) = lookup(env_vars::ANALYTICS_ID).filter(|id| !id.is_empty()) {
            self.analytics.measurement_id = Some(id);
        }
        Ok(self)
    }

    /// Set the runtime mode.
    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the public URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the API URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set query defaults.
    pub fn with_query(mut self, query: QueryDefaults) -> Self {
        self.query = query;
        self
    }

    /// Set analytics settings.
    pub fn with_analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = analytics;
        self
    }

    /// Configuration problems that do not prevent startup.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.query.is_consistent() {
            warnings.push(format!(
                "query.gc_time_ms ({}) is shorter than query.stale_time_ms ({}); entries may be evicted while still fresh",
                self.query.gc_time_ms, self.query.stale_time_ms
            ));
        }
        if self.analytics.enabled == Some(true) && self.analytics.measurement_id.is_none() {
            warnings.push("analytics.enabled is set but no measurement_id is configured".to_string());
        }
        warnings
    }
}

/// Defaults applied to every cached query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefaults {
    /// How long fetched data counts as fresh.
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,
    /// How long an unused entry is kept before eviction.
    #[serde(default = "default_gc_time_ms")]
    pub gc_time_ms: u64,
    /// Retries after the first failed attempt (client errors never retry).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_stale_time_ms() -> u64 {
    60 * 1000
}

fn default_gc_time_ms() -> u64 {
    10 * 60 * 1000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
            gc_time_ms: default_gc_time_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl QueryDefaults {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    /// Whether the eviction window covers the freshness window.
    pub fn is_consistent(&self) -> bool {
        self.gc_time_ms >= self.stale_time_ms
    }
}

/// Analytics settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Measurement ID (e.g. `G-XXXXXXX`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<String>,
    /// Explicit switch; when unset analytics follows the runtime mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl AnalyticsConfig {
    /// Create settings for a measurement ID.
    pub fn new(measurement_id: impl Into<String>) -> Self {
        Self {
            measurement_id: Some(measurement_id.into()),
            enabled: None,
        }
    }

    /// Force analytics on or off.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Whether analytics should run in the given mode.
    ///
    /// Without an explicit switch, analytics only runs in production.
    /// A missing measurement ID always disables it.
    pub fn is_active(&self, mode: RuntimeMode) -> bool {
        let enabled = self.enabled.unwrap_or_else(|| mode.is_production());
        enabled && self.measurement_id.is_some()
    }
}
