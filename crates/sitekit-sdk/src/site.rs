//! Site wiring: one config, one query client, one analytics client.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sitekit_boundary::{ErrorBoundary, View};
use sitekit_core::SiteConfig;
use sitekit_observability::{
    init_logging, AnalyticsClient, AnalyticsError, AnalyticsSink, LogFormat, TracingSink,
};
use sitekit_query::QueryClient;
use tokio::task::JoinHandle;

/// A configured SiteKit site.
///
/// # Example
///
/// ```rust,ignore
/// let site = SiteApp::new(SiteConfig::new("Docs").with_mode(RuntimeMode::Production))
///     .with_analytics_sink(Arc::new(DataLayerSink::new()));
/// site.start().await?;
/// ```
#[derive(Debug)]
pub struct SiteApp {
    config: SiteConfig,
    query: QueryClient,
    analytics: AnalyticsClient,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SiteApp {
    /// Build a site from its configuration. Analytics go to the log until a
    /// sink is set.
    pub fn new(config: SiteConfig) -> Self {
        let query = QueryClient::from_config(&config);
        let analytics =
            AnalyticsClient::from_config(&config.analytics, config.mode, Arc::new(TracingSink));
        Self {
            config,
            query,
            analytics,
            sweeper: Mutex::new(None),
        }
    }

    /// Send analytics commands to `sink`.
    pub fn with_analytics_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = AnalyticsClient::from_config(&self.config.analytics, self.config.mode, sink);
        self
    }

    /// Use an existing query client, e.g. [`QueryClient::global`].
    pub fn with_query_client(mut self, client: QueryClient) -> Self {
        self.query = client;
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn query_client(&self) -> &QueryClient {
        &self.query
    }

    pub fn analytics(&self) -> &AnalyticsClient {
        &self.analytics
    }

    /// Install the `tracing` subscriber for the site's mode.
    pub fn init_logging(&self) -> anyhow::Result<()> {
        init_logging(self.config.mode, LogFormat::for_mode(self.config.mode))
    }

    /// How often the background sweeper evicts idle query entries.
    pub fn sweep_interval(&self) -> Duration {
        self.config.query.gc_time().max(Duration::from_secs(1))
    }

    /// Start the query sweeper and initialize analytics.
    ///
    /// Must run inside a tokio runtime. Calling it again does not start a
    /// second sweeper.
    pub async fn start(&self) -> Result<(), AnalyticsError> {
        {
            let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
            if sweeper.is_none() {
                let interval = self.sweep_interval();
                *sweeper = Some(self.query.spawn_sweeper(interval));
                tracing::debug!(
                    interval_ms = interval.as_millis() as u64,
                    "query sweeper started"
                );
            }
        }
        self.analytics.init().await
    }

    /// Whether the background sweeper is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the query sweeper and tear down analytics.
    pub fn shutdown(&self) {
        self.stop_sweeper();
        self.analytics.teardown();
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    /// Wrap `view` in a boundary running in the site's mode.
    pub fn boundary(&self, name: impl Into<String>, view: impl View + 'static) -> ErrorBoundary {
        ErrorBoundary::new(view)
            .with_name(name)
            .with_mode(self.config.mode)
    }
}

impl Drop for SiteApp {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}
