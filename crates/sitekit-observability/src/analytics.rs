//! Analytics client with an explicit lifecycle.
//!
//! Commands mirror the gtag API (`js`, `config`, `event`) and are handed to an
//! [`AnalyticsSink`]. A client whose settings are inactive for the current
//! mode accepts every call and sends nothing.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sitekit_core::{AnalyticsConfig, RuntimeMode};

const GTAG_SCRIPT_URL: &str = "https://www.googletagmanager.com/gtag/js";

/// Analytics errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyticsError {
    #[error("analytics client used before init")]
    NotInitialized,

    #[error("analytics client used after teardown")]
    TornDown,

    #[error("analytics sink failed: {0}")]
    Sink(String),
}

/// gtag command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GtagCommand {
    Js,
    Config,
    Event,
}

/// A single analytics command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub command: GtagCommand,
    /// Measurement ID for `config`, event name for `event`, empty for `js`.
    pub target: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    fn new(command: GtagCommand, target: impl Into<String>) -> Self {
        Self {
            command,
            target: target.into(),
            params: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// A custom event.
    pub fn event(name: impl Into<String>) -> Self {
        Self::new(GtagCommand::Event, name)
    }

    pub fn config(measurement_id: impl Into<String>) -> Self {
        Self::new(GtagCommand::Config, measurement_id)
    }

    pub fn js() -> Self {
        Self::new(GtagCommand::Js, "")
    }

    /// Attach a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Destination for analytics commands.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn send(&self, event: AnalyticsEvent) -> Result<(), AnalyticsError>;
}

/// Keeps commands in memory, like the browser's `dataLayer`.
#[derive(Debug, Clone, Default)]
pub struct DataLayerSink {
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl DataLayerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands recorded so far.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalyticsSink for DataLayerSink {
    async fn send(&self, event: AnalyticsEvent) -> Result<(), AnalyticsError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

/// Writes commands to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl AnalyticsSink for TracingSink {
    async fn send(&self, event: AnalyticsEvent) -> Result<(), AnalyticsError> {
        tracing::info!(
            command = ?event.command,
            target = %event.target,
            params = %serde_json::Value::Object(event.params.clone()),
            "analytics"
        );
        Ok(())
    }
}

/// Lifecycle of an [`AnalyticsClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsState {
    Uninitialized,
    /// `init` is sending the loader commands.
    Initializing,
    Active,
    /// Inactive for this mode or missing a measurement ID.
    Disabled,
    TornDown,
}

/// Analytics capability passed to whoever needs to track.
pub struct AnalyticsClient {
    measurement_id: Option<String>,
    state: Mutex<AnalyticsState>,
    sink: Arc<dyn AnalyticsSink>,
}

impl AnalyticsClient {
    /// Build a client. Inactive settings yield a disabled client.
    pub fn from_config(
        config: &AnalyticsConfig,
        mode: RuntimeMode,
        sink: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let (measurement_id, state) = if config.is_active(mode) {
            (config.measurement_id.clone(), AnalyticsState::Uninitialized)
        } else {
            (None, AnalyticsState::Disabled)
        };
        Self {
            measurement_id,
            state: Mutex::new(state),
            sink,
        }
    }

    /// A client that never sends anything.
    pub fn disabled() -> Self {
        Self {
            measurement_id: None,
            state: Mutex::new(AnalyticsState::Disabled),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn state(&self) -> AnalyticsState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.state() != AnalyticsState::Disabled
    }

    pub fn measurement_id(&self) -> Option<&str> {
        self.measurement_id.as_deref()
    }

    /// Send the `js` and initial `config` commands.
    ///
    /// Only one caller sends them; calling `init` on a client that is active
    /// or already initializing does nothing. A sink failure returns the
    /// client to `Uninitialized`.
    pub async fn init(&self) -> Result<(), AnalyticsError> {
        let Some(id) = self.measurement_id.clone() else {
            return Ok(());
        };
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                AnalyticsState::Uninitialized => *state = AnalyticsState::Initializing,
                AnalyticsState::TornDown => return Err(AnalyticsError::TornDown),
                AnalyticsState::Disabled | AnalyticsState::Initializing | AnalyticsState::Active => {
                    return Ok(())
                }
            }
        }

        let sent = match self.sink.send(AnalyticsEvent::js()).await {
            Ok(()) => self.sink.send(AnalyticsEvent::config(id.as_str())).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.transition(AnalyticsState::Initializing, AnalyticsState::Uninitialized);
            return Err(e);
        }

        // A teardown during init wins.
        if self.transition(AnalyticsState::Initializing, AnalyticsState::Active) {
            tracing::debug!(measurement_id = %id, "analytics initialized");
        }
        Ok(())
    }

    /// Send a command through the sink.
    pub async fn track(&self, event: AnalyticsEvent) -> Result<(), AnalyticsError> {
        match self.state() {
            AnalyticsState::Disabled => Ok(()),
            AnalyticsState::Uninitialized | AnalyticsState::Initializing => {
                Err(AnalyticsError::NotInitialized)
            }
            AnalyticsState::TornDown => Err(AnalyticsError::TornDown),
            AnalyticsState::Active => self.sink.send(event).await,
        }
    }

    /// Track a named event with parameters.
    pub async fn track_event(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<(), AnalyticsError> {
        self.track(AnalyticsEvent::event(name).with_params(params))
            .await
    }

    /// Record a navigation. `page_path` is `path` followed by `query` as given.
    pub async fn track_page_view(&self, path: &str, query: &str) -> Result<(), AnalyticsError> {
        let Some(id) = self.measurement_id.as_deref() else {
            return Ok(());
        };
        let event = AnalyticsEvent::config(id).with_param("page_path", format!("{path}{query}"));
        self.track(event).await
    }

    /// Stop tracking. Later calls to `track` fail.
    pub fn teardown(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != AnalyticsState::Disabled {
            *state = AnalyticsState::TornDown;
        }
    }

    /// The gtag loader markup, or `None` when disabled or torn down.
    pub fn script_tags(&self) -> Option<String> {
        if matches!(
            self.state(),
            AnalyticsState::Disabled | AnalyticsState::TornDown
        ) {
            return None;
        }
        let id = self.measurement_id.as_deref()?;
        let id_literal = serde_json::to_string(id).unwrap_or_else(|_| "\"\"".to_string());
        Some(format!(
            "<script async src=\"{GTAG_SCRIPT_URL}?id={id}\"></script>\n\
             <script>\n\
             window.dataLayer = window.dataLayer || [];\n\
             function gtag(){{dataLayer.push(arguments);}}\n\
             gtag('js', new Date());\n\
             gtag('config', {id_literal}, {{\n\
             \x20 page_title: document.title,\n\
             \x20 page_location: window.location.href,\n\
             }});\n\
             </script>"
        ))
    }

    /// Move from `from` to `to`. Returns false if the state was not `from`.
    fn transition(&self, from: AnalyticsState, to: AnalyticsState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return false;
        }
        *state = to;
        true
    }
}

impl std::fmt::Debug for AnalyticsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsClient")
            .field("measurement_id", &self.measurement_id)
            .field("state", &self.state())
            .finish()
    }
}
