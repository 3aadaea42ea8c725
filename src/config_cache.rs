//! Per-application configuration cache.
//!
//! `ConfigCache` is the front door callers use to obtain a `LoggerHandle`. It
//! decides whether an application's current sinks can be reused or must be
//! rebuilt from new settings, and publishes the result as an immutable
//! `AppProfile` that the router and dispatcher read without locking.

use crate::config::LoggerConfig;
use crate::core::{is_valid_application_name, Formatter, MailTransport};
use crate::dispatch::{Dispatcher, LoggerHandle};
use crate::error::ConfigError;
use crate::formatting::PatternFormatter;
use crate::notification::AlertForwarder;
use crate::router::Router;
use crate::sink::RotationPolicy;
use anyhow::Context;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Everything derived from one application's `LoggerConfig`, built up front so
/// that publishing it is a single pointer swap.
pub struct AppProfile {
    /// Empty for the fallback profile.
    pub app_name: String,
    /// Increases with every rebuild. Sinks built from an older generation are stale.
    pub generation: u64,
    pub config: LoggerConfig,
    pub log_path: PathBuf,
    pub policy: RotationPolicy,
    pub formatter: Arc<dyn Formatter>,
    /// Present only when alerting is enabled and fully configured.
    pub forwarder: Option<Arc<AlertForwarder>>,
    /// Set on the placeholder left behind by a removed application. It routes
    /// like the fallback but outranks the generation of the removed profile.
    pub retired: bool,
}

impl AppProfile {
    /// Validates `config` and builds every resource it describes.
    ///
    /// An incomplete alert configuration is not an error: the alert path is
    /// disabled with a warning and routing proceeds without it.
    pub fn build(
        app_name: &str,
        config: LoggerConfig,
        generation: u64,
        transport: &Arc<dyn MailTransport>,
    ) -> anyhow::Result<Self> {
        let policy = RotationPolicy::from_config(&config).with_context(|| {
            format!(
                "invalid rotation sizes (max_file_size={:?}, total_size_cap={:?})",
                config.effective_max_file_size(),
                config.effective_total_size_cap()
            )
        })?;
        let formatter = PatternFormatter::new(config.effective_pattern())
            .with_context(|| format!("invalid log pattern {:?}", config.effective_pattern()))?;

        let forwarder = if config.alert.enabled {
            match AlertForwarder::new(app_name, &config.alert, Arc::clone(transport)) {
                Ok(forwarder) => Some(Arc::new(forwarder)),
                Err(e) => {
                    warn!(app = app_name, error = %e, "Alert forwarding disabled");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            app_name: app_name.to_string(),
            generation,
            log_path: config.effective_log_path(),
            policy,
            formatter: Arc::new(formatter),
            forwarder,
            config,
            retired: false,
        })
    }

    /// The placeholder for a removed `app`: the fallback's resources under a
    /// fresh generation, without alerting.
    fn retired(fallback: &AppProfile, app_name: &str, generation: u64) -> Self {
        Self {
            app_name: app_name.to_string(),
            generation,
            config: fallback.config.clone(),
            log_path: fallback.log_path.clone(),
            policy: fallback.policy,
            formatter: Arc::clone(&fallback.formatter),
            forwarder: None,
            retired: true,
        }
    }
}

impl std::fmt::Debug for AppProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppProfile")
            .field("app_name", &self.app_name)
            .field("generation", &self.generation)
            .field("log_path", &self.log_path)
            .field("policy", &self.policy)
            .field("alerting", &self.forwarder.is_some())
            .field("retired", &self.retired)
            .finish()
    }
}

/// The published `application -> AppProfile` map.
///
/// Readers load a snapshot of the whole map atomically, so they always see
/// either the complete old profile of an application or the complete new one.
pub struct ProfileStore {
    profiles: ArcSwap<HashMap<String, Arc<AppProfile>>>,
    fallback: Arc<AppProfile>,
}

impl ProfileStore {
    /// Creates an empty store. `fallback` serves applications never resolved.
    pub fn new(fallback: AppProfile) -> Self {
        Self {
            profiles: ArcSwap::from_pointee(HashMap::new()),
            fallback: Arc::new(fallback),
        }
    }

    /// The configured profile of `app`. Removed applications have none.
    pub fn get(&self, app: &str) -> Option<Arc<AppProfile>> {
        self.profiles
            .load()
            .get(app)
            .filter(|profile| !profile.retired)
            .cloned()
    }

    /// The profile events of `app` are routed with: its configured profile,
    /// the placeholder left by its removal, or the fallback.
    pub fn profile_for(&self, app: &str) -> Arc<AppProfile> {
        self.profiles
            .load()
            .get(app)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn fallback(&self) -> &Arc<AppProfile> {
        &self.fallback
    }

    pub(crate) fn publish(&self, profile: Arc<AppProfile>) {
        self.profiles.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(profile.app_name.clone(), Arc::clone(&profile));
            next
        });
    }

    /// Replaces the configured profile of `app` with a retired placeholder
    /// at `generation`, so sinks built from the removed profile compare as
    /// stale. Returns the removed profile.
    pub(crate) fn retire(&self, app: &str, generation: u64) -> Option<Arc<AppProfile>> {
        let previous = self.get(app)?;
        let placeholder = Arc::new(AppProfile::retired(&self.fallback, app, generation));
        self.publish(placeholder);
        Some(previous)
    }
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("applications", &self.profiles.load().len())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Maps application names to their effective configuration and keeps the
/// router's sinks in step with it.
pub struct ConfigCache {
    store: Arc<ProfileStore>,
    router: Arc<Router>,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn MailTransport>,
    // Guards the rebuild path only; lookups never take it.
    rebuild_lock: Mutex<()>,
    generations: AtomicU64,
}

impl ConfigCache {
    pub fn new(
        store: Arc<ProfileStore>,
        router: Arc<Router>,
        dispatcher: Arc<Dispatcher>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let first_generation = store.fallback().generation;
        Self {
            store,
            router,
            dispatcher,
            transport,
            rebuild_lock: Mutex::new(()),
            generations: AtomicU64::new(first_generation),
        }
    }

    /// Returns a handle for `app`, rebuilding its sinks only if `requested`
    /// is not equivalent to the cached configuration.
    ///
    /// Concurrent callers asking for the same new configuration rebuild it
    /// once; the others observe the finished result.
    pub fn resolve(&self, app: &str, requested: LoggerConfig) -> Result<LoggerHandle, ConfigError> {
        validate_name(app)?;

        if self.is_current(app, &requested) {
            debug!(app, "Using cached logger");
            return Ok(self.handle(app));
        }

        let _guard = self.rebuild_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_current(app, &requested) {
            debug!(app, "Using cached logger");
            return Ok(self.handle(app));
        }

        info!(app, "Configuring new logger");
        self.rebuild(app, requested)?;
        Ok(self.handle(app))
    }

    /// Rebuilds `app` from `config` even if it is equivalent to the current one.
    pub fn reload(&self, app: &str, config: LoggerConfig) -> Result<(), ConfigError> {
        validate_name(app)?;
        info!(app, ?config, "Reloading logger");

        let _guard = self.rebuild_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.rebuild(app, config)?;
        info!(app, "Logger successfully reloaded");
        Ok(())
    }

    /// Decommissions `app`: forgets its configuration and closes its sinks.
    /// Metrics are kept. Returns whether a configuration was cached.
    pub fn remove(&self, app: &str) -> bool {
        let _guard = self.rebuild_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = self.store.retire(app, self.next_generation()).is_some();
        let closed = self.router.remove_application(app);
        if removed || closed > 0 {
            info!(app, closed, "Removed application");
        }
        removed
    }

    /// The cached configuration of `app`, if it was resolved.
    pub fn current(&self, app: &str) -> Option<LoggerConfig> {
        self.store.get(app).map(|profile| profile.config.clone())
    }

    /// A handle bound to `app`'s current configuration, without rebuilding.
    pub fn handle(&self, app: &str) -> LoggerHandle {
        LoggerHandle::new(app, Arc::clone(&self.dispatcher))
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, app: &str, requested: &LoggerConfig) -> bool {
        self.store
            .get(app)
            .is_some_and(|profile| profile.config.is_equivalent(requested))
    }

    /// Builds the new profile first, then publishes it and retires the old
    /// sinks. A failed build leaves the previous profile in place.
    fn rebuild(&self, app: &str, config: LoggerConfig) -> Result<(), ConfigError> {
        let generation = self.next_generation();
        let profile = AppProfile::build(app, config, generation, &self.transport).map_err(|source| {
            error!(app, error = %format!("{:#}", source), "Failed to configure logger");
            ConfigError::Configuration {
                app: app.to_string(),
                source,
            }
        })?;

        let alerting = profile.forwarder.is_some();
        let log_path = profile.log_path.clone();
        self.store.publish(Arc::new(profile));
        let closed = self.router.remove_application(app);
        metrics::counter!("config_rebuilds_total").increment(1);
        info!(
            app,
            generation,
            log_path = %log_path.display(),
            alerting,
            closed_sinks = closed,
            "Logger configured successfully"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("store", &self.store)
            .field("generation", &self.generations.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn validate_name(app: &str) -> Result<(), ConfigError> {
    if !is_valid_application_name(app) {
        return Err(ConfigError::InvalidConfig);
    }
    Ok(())
}
