//! The top-level router object, decoupled from the entry point.

use crate::{
    config::{LoggerConfig, Settings},
    config_cache::{AppProfile, ConfigCache, ProfileStore},
    core::{LogEvent, MailTransport, SinkFactory},
    dispatch::{Dispatcher, LoggerHandle},
    error::{ConfigError, RouteError},
    internal_metrics::{describe_metrics, MetricsRegistry},
    notification::LoggingTransport,
    router::Router,
    sink::FileSinkFactory,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// A handle to the running log router and every registry it owns.
///
/// Dropping it does not close sinks; call [`LogRouter::shutdown`] for that.
#[derive(Debug)]
pub struct LogRouter {
    router: Arc<Router>,
    cache: Arc<ConfigCache>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsRegistry>,
}

impl LogRouter {
    /// Creates a new `LogRouterBuilder`. `defaults` configures applications
    /// that are routed to without ever being resolved.
    pub fn builder(defaults: LoggerConfig) -> LogRouterBuilder {
        LogRouterBuilder::new(defaults)
    }

    /// Builds a router from loaded settings and resolves every configured
    /// application up front.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let router = Self::builder(settings.defaults.clone()).build()?;
        for (app, config) in &settings.applications {
            router.resolve(app, config.clone())?;
        }
        Ok(router)
    }

    /// A handle for `app`. Keeps its current configuration if it has one,
    /// otherwise configures it from the defaults.
    pub fn logger(&self, app: &str) -> Result<LoggerHandle, ConfigError> {
        match self.cache.current(app) {
            Some(_) => Ok(self.cache.handle(app)),
            None => self
                .cache
                .resolve(app, self.cache.store().fallback().config.clone()),
        }
    }

    /// A handle for `app` configured with `config`; see [`ConfigCache::resolve`].
    pub fn resolve(&self, app: &str, config: LoggerConfig) -> Result<LoggerHandle, ConfigError> {
        self.cache.resolve(app, config)
    }

    pub fn reload(&self, app: &str, config: LoggerConfig) -> Result<(), ConfigError> {
        self.cache.reload(app, config)
    }

    pub fn remove(&self, app: &str) -> bool {
        self.cache.remove(app)
    }

    /// Routes one event directly, reporting failures instead of swallowing them.
    pub fn route(&self, event: &LogEvent) -> Result<(), RouteError> {
        self.router.route(event)
    }

    /// Routes one event the way a `LoggerHandle` does, alert path included.
    pub fn dispatch(&self, event: &LogEvent) {
        self.dispatcher.dispatch(event);
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn config_cache(&self) -> &Arc<ConfigCache> {
        &self.cache
    }

    /// Flushes every open sink.
    pub fn flush(&self) {
        self.router.flush_all();
    }

    /// Closes every sink. Events routed afterwards recreate their sinks.
    pub fn shutdown(&self) {
        info!(sinks = self.router.sink_count(), "Shutting down log router");
        self.router.close_all();
    }
}

/// Builder for the log router.
///
/// Separates constructing the components from using them, and lets tests
/// swap the sink factory, mail transport and metrics registry.
pub struct LogRouterBuilder {
    defaults: LoggerConfig,
    sink_factory_override: Option<Arc<dyn SinkFactory>>,
    transport_override: Option<Arc<dyn MailTransport>>,
    metrics_override: Option<Arc<MetricsRegistry>>,
}

impl LogRouterBuilder {
    pub fn new(defaults: LoggerConfig) -> Self {
        Self {
            defaults,
            sink_factory_override: None,
            transport_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the sink factory for testing.
    pub fn sink_factory(mut self, factory: Arc<dyn SinkFactory>) -> Self {
        self.sink_factory_override = Some(factory);
        self
    }

    /// Overrides the mail transport used by alert forwarders.
    pub fn transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport_override = Some(transport);
        self
    }

    /// Overrides the metrics registry for testing.
    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Wires every component together.
    ///
    /// # Returns
    /// * `Err(ConfigError::Configuration)` if the defaults cannot be built
    #[instrument(skip_all)]
    pub fn build(self) -> Result<LogRouter, ConfigError> {
        describe_metrics();

        let factory = self
            .sink_factory_override
            .unwrap_or_else(|| Arc::new(FileSinkFactory) as Arc<dyn SinkFactory>);
        let transport = self
            .transport_override
            .unwrap_or_else(|| Arc::new(LoggingTransport::new()) as Arc<dyn MailTransport>);
        let metrics = self.metrics_override.unwrap_or_default();

        let fallback = AppProfile::build("", self.defaults, 0, &transport).map_err(|source| {
            ConfigError::Configuration {
                app: "<defaults>".to_string(),
                source,
            }
        })?;
        let log_path = fallback.log_path.clone();
        let store = Arc::new(ProfileStore::new(fallback));

        let router = Arc::new(Router::new(Arc::clone(&store), factory, Arc::clone(&metrics)));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&router), Arc::clone(&store)));
        let cache = Arc::new(ConfigCache::new(
            store,
            Arc::clone(&router),
            Arc::clone(&dispatcher),
            transport,
        ));

        info!(default_log_path = %log_path.display(), "Log router initialized");

        Ok(LogRouter {
            router,
            cache,
            dispatcher,
            metrics,
        })
    }
}
