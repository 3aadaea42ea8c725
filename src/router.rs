//! The dynamic sink router.
//!
//! Owns the `(application, severity) -> sink` cache. Sinks are created lazily
//! on the first event for a key, with at most one creation per key even when
//! many threads race on the same never-seen key. Creation is serialized per
//! key, so a slow directory or file open never holds up lookups of sinks that
//! already exist. Each cached sink remembers
//! the profile generation it was built from, so a sink built from a
//! configuration that has since been replaced is never written to again.

use crate::config_cache::{AppProfile, ProfileStore};
use crate::core::{
    is_valid_application_name, LogEvent, RollingSink, SinkFactory, SinkKey, SinkSpec, Severity,
};
use crate::error::{RouteError, SinkError};
use crate::internal_metrics::MetricsRegistry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// A cached sink together with the profile generation it belongs to.
struct SinkSlot {
    generation: u64,
    sink: Mutex<Option<Box<dyn RollingSink>>>,
}

impl SinkSlot {
    fn new(generation: u64, sink: Box<dyn RollingSink>) -> Self {
        Self {
            generation,
            sink: Mutex::new(Some(sink)),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(sink) => sink.write(bytes).map_err(SinkError::Write),
            None => Err(SinkError::Closed),
        }
    }

    fn flush(&self) {
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = guard.as_mut() {
            if let Err(e) = sink.flush() {
                warn!(error = %e, "Failed to flush sink");
            }
        }
    }

    fn close(&self, key: &SinkKey) {
        let taken = self.sink.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut sink) = taken {
            if let Err(e) = sink.close() {
                warn!(sink = %key, error = %e, "Failed to close sink cleanly");
            }
        }
    }
}

/// Routes events to per-application, per-severity sinks.
pub struct Router {
    sinks: DashMap<SinkKey, Arc<SinkSlot>>,
    // Held across sink creation for one key. Entries are never removed.
    creation_locks: DashMap<SinkKey, Arc<Mutex<()>>>,
    profiles: Arc<ProfileStore>,
    factory: Arc<dyn SinkFactory>,
    metrics: Arc<MetricsRegistry>,
}

impl Router {
    pub fn new(
        profiles: Arc<ProfileStore>,
        factory: Arc<dyn SinkFactory>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            sinks: DashMap::new(),
            creation_locks: DashMap::new(),
            profiles,
            factory,
            metrics,
        }
    }

    /// Delivers one event to the sink for its `(application, severity)` key.
    ///
    /// # Returns
    /// * `Ok(())` once the rendered event was written and metrics recorded
    /// * `Err(InvalidApplication)` for a blank name, or one that would leave
    ///   the log root (absolute, or with `.`/`..` segments)
    /// * `Err(SinkUnavailable)` if the sink could not be created or written;
    ///   nothing is cached for a failed creation, so the next event retries
    pub fn route(&self, event: &LogEvent) -> Result<(), RouteError> {
        if !is_valid_application_name(&event.application) {
            return Err(RouteError::InvalidApplication);
        }

        let key = event.sink_key();

        // A slot may be closed by a concurrent rebuild between resolution and
        // write; drop it from the cache if still there and resolve once more
        // against the freshly published profile.
        let mut last_error = SinkError::Closed;
        for _ in 0..2 {
            let profile = self.profiles.profile_for(&event.application);
            let slot = self.resolve(&key, &profile)?;
            let rendered = profile.formatter.format(event);
            match slot.write(rendered.as_bytes()) {
                Ok(()) => {
                    self.metrics.record(&event.application, event.message.len() as u64);
                    return Ok(());
                }
                Err(SinkError::Closed) => {
                    debug!(sink = %key, "Sink closed during write, resolving again");
                    self.sinks.remove_if(&key, |_, cached| Arc::ptr_eq(cached, &slot));
                }
                Err(e) => {
                    last_error = e;
                    break;
                }
            }
        }

        Err(RouteError::SinkUnavailable {
            app: key.application,
            severity: key.severity,
            source: last_error,
        })
    }

    /// Removes and closes every sink of `app`. Returns how many were closed.
    pub fn remove_application(&self, app: &str) -> usize {
        let mut closed = 0;
        for severity in Severity::ALL {
            let key = SinkKey::new(app, severity);
            if let Some((key, slot)) = self.sinks.remove(&key) {
                slot.close(&key);
                info!(app, severity = %severity, "Removed sink");
                closed += 1;
            }
        }
        closed
    }

    /// Whether a sink is currently cached for `key`.
    pub fn has_sink(&self, key: &SinkKey) -> bool {
        self.sinks.contains_key(key)
    }

    /// Number of sinks currently cached.
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Flushes every open sink.
    pub fn flush_all(&self) {
        let slots: Vec<Arc<SinkSlot>> = self.sinks.iter().map(|e| Arc::clone(e.value())).collect();
        for slot in slots {
            slot.flush();
        }
    }

    /// Removes and closes every sink.
    pub fn close_all(&self) {
        let keys: Vec<SinkKey> = self.sinks.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((key, slot)) = self.sinks.remove(&key) {
                slot.close(&key);
            }
        }
        info!("All sinks closed");
    }

    /// Returns the sink for `key` built from `profile`, creating it if needed.
    ///
    /// The fast path is a shard read. A miss or a stale slot takes the key's
    /// creation lock, checks again, and creates the sink with no shard lock
    /// held. A cached slot from a newer generation is used as is.
    fn resolve(&self, key: &SinkKey, profile: &AppProfile) -> Result<Arc<SinkSlot>, RouteError> {
        if let Some(slot) = self.current_slot(key, profile) {
            return Ok(slot);
        }

        let creation = Arc::clone(self.creation_locks.entry(key.clone()).or_default().value());
        let _creating = creation.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = self.current_slot(key, profile) {
            return Ok(slot);
        }

        let slot = Arc::new(self.create_slot(key, profile)?);
        if let Some(stale) = self.sinks.insert(key.clone(), Arc::clone(&slot)) {
            debug!(sink = %key, generation = stale.generation, "Closing stale sink");
            stale.close(key);
        }
        Ok(slot)
    }

    fn current_slot(&self, key: &SinkKey, profile: &AppProfile) -> Option<Arc<SinkSlot>> {
        self.sinks
            .get(key)
            .map(|slot| Arc::clone(slot.value()))
            .filter(|slot| slot.generation >= profile.generation)
    }

    fn create_slot(&self, key: &SinkKey, profile: &AppProfile) -> Result<SinkSlot, RouteError> {
        let spec = SinkSpec {
            key: key.clone(),
            directory: profile.log_path.join(&key.application),
            policy: profile.policy,
        };

        match self.factory.create(&spec) {
            Ok(sink) => {
                metrics::counter!("sinks_created_total").increment(1);
                info!(
                    app = %key.application,
                    severity = %key.severity,
                    directory = %spec.directory.display(),
                    "Created sink"
                );
                Ok(SinkSlot::new(profile.generation, sink))
            }
            Err(source) => {
                metrics::counter!("sink_creation_failures_total").increment(1);
                error!(
                    app = %key.application,
                    severity = %key.severity,
                    error = %source,
                    "Failed to create sink"
                );
                Err(RouteError::SinkUnavailable {
                    app: key.application.clone(),
                    severity: key.severity,
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggerConfig;
    use crate::core::MailTransport;
    use crate::notification::LoggingTransport;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Record {
        directory: PathBuf,
        lines: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl Record {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct FakeSink(Arc<Record>);

    impl RollingSink for FakeSink {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.0.lines.lock().unwrap().push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.0.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    // Stalls the creation of one application's sink until released.
    struct Hold {
        app: String,
        started: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    #[derive(Default)]
    struct FakeFactory {
        created: Mutex<Vec<(SinkKey, Arc<Record>)>>,
        hold: Mutex<Option<Hold>>,
    }

    impl FakeFactory {
        fn created_for(&self, key: &SinkKey) -> Vec<Arc<Record>> {
            self.created
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, record)| Arc::clone(record))
                .collect()
        }

        fn total(&self) -> usize {
            self.created.lock().unwrap().len()
        }
    }

    impl SinkFactory for FakeFactory {
        fn create(&self, spec: &SinkSpec) -> Result<Box<dyn RollingSink>, SinkError> {
            let hold = {
                let mut hold = self.hold.lock().unwrap();
                if hold.as_ref().is_some_and(|h| h.app == spec.key.application) {
                    hold.take()
                } else {
                    None
                }
            };
            if let Some(hold) = hold {
                hold.started.send(()).unwrap();
                hold.release.recv().unwrap();
            }

            let record = Arc::new(Record {
                directory: spec.directory.clone(),
                ..Record::default()
            });
            self.created.lock().unwrap().push((spec.key.clone(), Arc::clone(&record)));
            Ok(Box::new(FakeSink(record)))
        }
    }

    fn profile(app: &str, log_path: &str, generation: u64) -> Arc<AppProfile> {
        let transport: Arc<dyn MailTransport> = Arc::new(LoggingTransport::new());
        let config = LoggerConfig::new().log_path(log_path).log_pattern("%msg%n");
        Arc::new(AppProfile::build(app, config, generation, &transport).unwrap())
    }

    fn create_router(factory: Arc<FakeFactory>) -> (Router, Arc<ProfileStore>) {
        let fallback = Arc::try_unwrap(profile("", "/tmp/fallback", 0)).unwrap();
        let store = Arc::new(ProfileStore::new(fallback));
        let router = Router::new(Arc::clone(&store), factory, Arc::new(MetricsRegistry::new()));
        (router, store)
    }

    fn info(app: &str, message: &str) -> LogEvent {
        LogEvent::new(app, Severity::Info, message)
    }

    #[test]
    fn test_stale_generation_slot_is_replaced_and_closed() {
        let factory = Arc::new(FakeFactory::default());
        let (router, store) = create_router(factory.clone());
        let key = SinkKey::new("Orders", Severity::Info);

        store.publish(profile("Orders", "/tmp/first", 1));
        router.route(&info("Orders", "one")).unwrap();
        // Published without retiring the old sinks, as a racing route would see it.
        store.publish(profile("Orders", "/tmp/second", 2));
        router.route(&info("Orders", "two")).unwrap();

        let sinks = factory.created_for(&key);
        assert_eq!(sinks.len(), 2);
        assert!(sinks[0].is_closed());
        assert_eq!(sinks[0].lines(), vec!["one\n"]);
        assert!(!sinks[1].is_closed());
        assert_eq!(sinks[1].lines(), vec!["two\n"]);
        assert_eq!(sinks[1].directory, PathBuf::from("/tmp/second/Orders"));
        assert_eq!(router.sink_count(), 1);
    }

    #[test]
    fn test_newer_slot_serves_an_older_profile() {
        let factory = Arc::new(FakeFactory::default());
        let (router, store) = create_router(factory.clone());
        let key = SinkKey::new("Orders", Severity::Info);
        let older = profile("Orders", "/tmp/first", 1);

        store.publish(profile("Orders", "/tmp/second", 2));
        router.route(&info("Orders", "current")).unwrap();
        let slot = router.resolve(&key, &older).unwrap();

        assert_eq!(slot.generation, 2);
        assert_eq!(factory.total(), 1);
    }

    #[test]
    fn test_closed_slot_is_evicted_and_write_retried() {
        let factory = Arc::new(FakeFactory::default());
        let (router, store) = create_router(factory.clone());
        let key = SinkKey::new("Orders", Severity::Info);
        store.publish(profile("Orders", "/tmp/orders", 1));

        // A slot closed by a rebuild after it was looked up but before the write.
        let closed = Arc::new(SinkSlot {
            generation: 1,
            sink: Mutex::new(None),
        });
        router.sinks.insert(key.clone(), Arc::clone(&closed));

        router.route(&info("Orders", "after close")).unwrap();

        let sinks = factory.created_for(&key);
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].lines(), vec!["after close\n"]);
        assert!(!Arc::ptr_eq(router.sinks.get(&key).unwrap().value(), &closed));
        assert_eq!(router.metrics.snapshot("Orders").unwrap().total_log_events, 1);
    }

    #[test]
    fn test_slot_closed_by_removal_rejects_writes() {
        let factory = Arc::new(FakeFactory::default());
        let (router, store) = create_router(factory.clone());
        let key = SinkKey::new("Orders", Severity::Info);
        let orders = profile("Orders", "/tmp/orders", 1);
        store.publish(Arc::clone(&orders));

        let slot = router.resolve(&key, &orders).unwrap();
        assert_eq!(router.remove_application("Orders"), 1);
        assert!(matches!(slot.write(b"late"), Err(SinkError::Closed)));

        router.route(&info("Orders", "fresh")).unwrap();
        let sinks = factory.created_for(&key);
        assert_eq!(sinks.len(), 2);
        assert!(sinks[0].lines().is_empty());
        assert_eq!(sinks[1].lines(), vec!["fresh\n"]);
    }

    #[test]
    fn test_sink_built_after_removal_is_retired() {
        let factory = Arc::new(FakeFactory::default());
        let (router, store) = create_router(factory.clone());
        let key = SinkKey::new("Orders", Severity::Info);
        let orders = profile("Orders", "/tmp/orders", 1);
        store.publish(Arc::clone(&orders));

        assert!(store.retire("Orders", 2).is_some());
        router.remove_application("Orders");
        // A route that loaded the removed profile finishes after the removal.
        router.resolve(&key, &orders).unwrap();

        router.route(&info("Orders", "after removal")).unwrap();

        let sinks = factory.created_for(&key);
        assert_eq!(sinks.len(), 2);
        assert!(sinks[0].is_closed());
        assert!(sinks[0].lines().is_empty());
        assert_eq!(sinks[1].directory, PathBuf::from("/tmp/fallback/Orders"));
        assert_eq!(sinks[1].lines(), vec!["after removal\n"]);
        assert_eq!(router.sink_count(), 1);
    }

    #[test]
    fn test_names_outside_log_root_are_rejected() {
        let factory = Arc::new(FakeFactory::default());
        let (router, _store) = create_router(factory.clone());

        for name in ["/tmp/elsewhere/evil", "../escaped", "Orders/../../escaped", "."] {
            let err = router.route(&info(name, "nope")).unwrap_err();
            assert!(matches!(err, RouteError::InvalidApplication), "{name:?}");
        }
        assert_eq!(factory.total(), 0);
        assert_eq!(router.metrics.logger_count(), 0);
    }

    #[test]
    fn test_slow_creation_does_not_block_cached_keys() {
        const WARM: usize = 64;
        let factory = Arc::new(FakeFactory::default());
        let (router, _store) = create_router(factory.clone());
        for i in 0..WARM {
            router.route(&info(&format!("app-{i}"), "warm")).unwrap();
        }

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *factory.hold.lock().unwrap() = Some(Hold {
            app: "brand-new".to_string(),
            started: started_tx,
            release: release_rx,
        });
        let (done_tx, done_rx) = mpsc::channel();

        std::thread::scope(|s| {
            let router = &router;
            s.spawn(move || router.route(&info("brand-new", "slow")).unwrap());
            started_rx.recv().unwrap();

            // Waits on the held creation rather than starting a second one.
            s.spawn(move || router.route(&info("brand-new", "second")).unwrap());
            s.spawn(move || {
                for i in 0..WARM {
                    router.route(&info(&format!("app-{i}"), "hot")).unwrap();
                }
                done_tx.send(()).unwrap();
            });

            let finished = done_rx.recv_timeout(Duration::from_secs(5));
            release_tx.send(()).unwrap();
            assert!(finished.is_ok(), "routes to cached keys waited on another key's creation");
        });

        let key = SinkKey::new("brand-new", Severity::Info);
        let sinks = factory.created_for(&key);
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].lines().len(), 2);
        assert_eq!(factory.total(), WARM + 1);
    }
}
