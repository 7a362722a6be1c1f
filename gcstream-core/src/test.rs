//! In-memory sinks for asserting on emitted telemetry.
//!
//! **Feature:** `test` (*disabled by default*)
//!
//! [`TestSink`] keeps every submitted record and can be told to fail or panic
//! on demand. [`TestSinkFactory`] hands out one shared `TestSink` and records
//! which identities were opened.
//!
//! # Example usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use gcstream_core::test::TestSink;
//! use gcstream_core::{CumulativeGcState, GcCycleEvent, GcTelemetryProcessor, Sink};
//!
//! let sink = TestSink::new();
//! let processor = GcTelemetryProcessor::new(Arc::new(CumulativeGcState::new()), "demo");
//! sink.submit(processor.process(&GcCycleEvent::default())).unwrap();
//!
//! assert_eq!(sink.fetch_and_clear_records().len(), 1);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::SinkError;
use crate::protocol::TelemetryRecord;
use crate::sink::{Sink, SinkFactory};

/// Collects records instead of storing them.
///
/// Submissions and flushes can be made to fail to exercise error paths.
#[derive(Debug, Default)]
pub struct TestSink {
    collected: Mutex<Vec<TelemetryRecord>>,
    fail_submit: AtomicBool,
    panic_on_submit: AtomicBool,
    fail_flush: AtomicBool,
    submits: AtomicUsize,
    flushes: AtomicUsize,
    closes: AtomicUsize,
}

impl TestSink {
    /// Creates a new test sink.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestSink> {
        Arc::new(TestSink::default())
    }

    /// Fetches and clears the collected records.
    pub fn fetch_and_clear_records(&self) -> Vec<TelemetryRecord> {
        let mut guard = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }

    /// Makes subsequent submissions fail with an error.
    pub fn fail_submits(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent submissions panic.
    pub fn panic_on_submits(&self, panic: bool) {
        self.panic_on_submit.store(panic, Ordering::SeqCst);
    }

    /// Makes subsequent flushes fail with an error.
    pub fn fail_flushes(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    /// Number of `submit` calls, including failed ones.
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    /// Number of `flush` calls, including failed ones.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Sink for TestSink {
    fn submit(&self, record: TelemetryRecord) -> Result<(), SinkError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_submit.load(Ordering::SeqCst) {
            panic!("test sink refused record {}", record.name);
        }
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(SinkError::custom("test sink refused record"));
        }
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    fn flush(&self, timeout: Duration) -> Result<(), SinkError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(SinkError::FlushTimeout(timeout));
        }
        Ok(())
    }

    fn close(&self, _timeout: Duration) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared [`TestSink`] and counts how often it was opened.
#[derive(Debug)]
pub struct TestSinkFactory {
    sink: Arc<TestSink>,
    opened: Mutex<Vec<String>>,
    fail: AtomicBool,
    open_delay: Option<Duration>,
}

impl TestSinkFactory {
    /// Creates a factory around a fresh sink.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestSinkFactory> {
        Self::with_open_delay(None)
    }

    /// Creates a factory whose `open` sleeps first, widening install races.
    pub fn with_open_delay(delay: Option<Duration>) -> Arc<TestSinkFactory> {
        Arc::new(TestSinkFactory {
            sink: TestSink::new(),
            opened: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            open_delay: delay,
        })
    }

    /// The sink handed out by `open`.
    pub fn sink(&self) -> Arc<TestSink> {
        self.sink.clone()
    }

    /// Makes subsequent opens fail.
    pub fn fail_opens(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Identities passed to `open`, in call order.
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SinkFactory for TestSinkFactory {
    fn open(&self, identity: &str) -> Result<Arc<dyn Sink>, SinkError> {
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(identity.to_owned());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Open {
                identity: identity.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such sink"),
            });
        }
        Ok(self.sink.clone())
    }
}
