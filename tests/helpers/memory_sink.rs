#![allow(dead_code)]
//! An in-memory sink factory that counts creations per key.

use logroute::core::{RollingSink, SinkFactory, SinkKey, SinkSpec};
use logroute::error::SinkError;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What one created sink received, shared between the sink and the test.
#[derive(Debug, Default)]
pub struct SinkRecord {
    pub directory: PathBuf,
    pub lines: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl SinkRecord {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MemorySink {
    record: Arc<SinkRecord>,
}

impl RollingSink for MemorySink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.record.is_closed() {
            return Err(io::Error::new(io::ErrorKind::Other, "sink closed"));
        }
        self.record
            .lines
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.record.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every sink it creates. Can be told to fail or to stall creation.
#[derive(Debug, Default)]
pub struct CountingSinkFactory {
    created: Mutex<HashMap<SinkKey, Vec<Arc<SinkRecord>>>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl CountingSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps inside every creation, widening the window for races.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of creation attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of sinks successfully created for `key`.
    pub fn creations(&self, key: &SinkKey) -> usize {
        self.created.lock().unwrap().get(key).map_or(0, Vec::len)
    }

    pub fn total_creations(&self) -> usize {
        self.created.lock().unwrap().values().map(Vec::len).sum()
    }

    /// Every sink created for `key`, oldest first.
    pub fn sinks(&self, key: &SinkKey) -> Vec<Arc<SinkRecord>> {
        self.created.lock().unwrap().get(key).cloned().unwrap_or_default()
    }

    pub fn latest(&self, key: &SinkKey) -> Option<Arc<SinkRecord>> {
        self.sinks(key).last().cloned()
    }
}

impl SinkFactory for CountingSinkFactory {
    fn create(&self, spec: &SinkSpec) -> Result<Box<dyn RollingSink>, SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::CreateDirectory {
                path: spec.directory.clone(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            });
        }

        let record = Arc::new(SinkRecord {
            directory: spec.directory.clone(),
            ..SinkRecord::default()
        });
        self.created
            .lock()
            .unwrap()
            .entry(spec.key.clone())
            .or_default()
            .push(Arc::clone(&record));
        Ok(Box::new(MemorySink { record }))
    }
}
