//! Final records at process exit and on uncaught faults.

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use gcstream_core::utils::{report_failure, unix_millis};
use gcstream_core::{
    gcstream_debug, GcRuntime, Level, OpType, Sink, SinkError, TelemetryRecord, Timing, ValueType,
};

use crate::listener::{contained, submit_contained};

/// Name of the record emitted at process exit.
pub const SHUTDOWN_RECORD: &str = "process-shutdown";
/// Prefix of the record emitted for an uncaught fault.
pub const FAULT_RECORD_PREFIX: &str = "uncaughtException-";

/// Notified when the process terminates normally.
pub trait ExitObserver: Send + Sync {
    /// Called at most once per process; later calls are ignored.
    fn on_process_exit(&self);
}

/// Notified when a thread dies from an uncaught fault.
pub trait FaultObserver: Send + Sync {
    /// Reports `fault`, raised on the thread labelled `thread_label`.
    ///
    /// Never panics and never blocks termination beyond a bounded flush.
    fn on_uncaught_fault(&self, thread_label: &str, fault: &(dyn Error + 'static));
}

/// Emits the shutdown record and flushes the sink.
pub struct ExitReporter {
    sink: Arc<dyn Sink>,
    resource_label: String,
    runtime: Arc<dyn GcRuntime>,
    started: Instant,
    timeout: Duration,
    exited: AtomicBool,
}

impl ExitReporter {
    /// Creates a reporter; uptime is measured from now unless the runtime
    /// reports its own.
    pub fn new(
        sink: Arc<dyn Sink>,
        resource_label: impl Into<String>,
        runtime: Arc<dyn GcRuntime>,
        timeout: Duration,
    ) -> Self {
        ExitReporter {
            sink,
            resource_label: resource_label.into(),
            runtime,
            started: Instant::now(),
            timeout,
            exited: AtomicBool::new(false),
        }
    }

    /// Whether the exit record has been emitted.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn uptime(&self) -> Duration {
        self.runtime
            .uptime()
            .unwrap_or_else(|| self.started.elapsed())
    }
}

impl ExitObserver for ExitReporter {
    fn on_process_exit(&self) {
        if self.exited.swap(true, Ordering::SeqCst) {
            gcstream_debug!("process exit already reported");
            return;
        }
        // flushes and closes even if building or submitting the record panics
        let _flush = FlushGuard {
            sink: &*self.sink,
            timeout: self.timeout,
            close: true,
        };

        let uptime = self.uptime();
        let uptime_ms = u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX);
        let mut record = TelemetryRecord::new(SHUTDOWN_RECORD, Level::Debug, OpType::Stop);
        record.resource = Some(self.resource_label.clone());
        record.message = Some(format!(
            "{} stopped, uptime={}",
            self.resource_label, uptime_ms
        ));
        record.timing = Timing::ending_at(
            now_us(),
            u64::try_from(uptime.as_micros()).unwrap_or(u64::MAX),
        );
        record.add_property("uptimeMs", uptime_ms, ValueType::AgeMsec);

        gcstream_debug!("reporting process exit after {}ms", uptime_ms);
        submit_contained(&*self.sink, record, "failed to report process shutdown");
    }
}

/// Emits a fatal record per uncaught fault.
pub struct FaultReporter {
    sink: Arc<dyn Sink>,
    resource_label: String,
    timeout: Duration,
    last_fault_ms: AtomicU64,
}

impl FaultReporter {
    /// Creates a reporter that has not seen any fault yet.
    pub fn new(sink: Arc<dyn Sink>, resource_label: impl Into<String>, timeout: Duration) -> Self {
        FaultReporter {
            sink,
            resource_label: resource_label.into(),
            timeout,
            last_fault_ms: AtomicU64::new(0),
        }
    }

    /// Milliseconds since the previous fault, and records now as the latest.
    fn elapsed_since_last_fault(&self, now_ms: u64) -> u64 {
        // zero means "no fault yet", so never store it
        let previous = self.last_fault_ms.swap(now_ms.max(1), Ordering::SeqCst);
        if previous == 0 {
            0
        } else {
            now_ms.saturating_sub(previous)
        }
    }

    fn build_record(&self, thread_label: &str, fault: &(dyn Error + 'static)) -> TelemetryRecord {
        let now = SystemTime::now();
        let elapsed_ms = self.elapsed_since_last_fault(unix_millis(now));

        let mut record = TelemetryRecord::new(
            format!("{}{}", FAULT_RECORD_PREFIX, thread_label),
            Level::Fatal,
            OpType::Event,
        );
        record.category = Some(thread_label.to_owned());
        record.resource = Some(self.resource_label.clone());
        record.message = Some(fault.to_string());
        record.exception = Some(fault_detail(fault));
        record.timing = Timing::ending_at(now_us(), elapsed_ms.saturating_mul(1000));
        record.add_property("elapsedSinceLastFaultMs", elapsed_ms, ValueType::AgeMsec);
        record
    }
}

impl FaultObserver for FaultReporter {
    fn on_uncaught_fault(&self, thread_label: &str, fault: &(dyn Error + 'static)) {
        let _flush = FlushGuard {
            sink: &*self.sink,
            timeout: self.timeout,
            close: false,
        };
        let record = match contained(|| self.build_record(thread_label, fault)) {
            Ok(record) => record,
            Err(_) => {
                report_failure(
                    "failed to report uncaught fault",
                    &SinkError::custom("building the fault record panicked"),
                );
                return;
            }
        };
        submit_contained(&*self.sink, record, "failed to report uncaught fault");
    }
}

/// Both terminal reporters of a collector.
///
/// The two roles stay separate capabilities: hosts that only get an exit
/// callback wire [`exit_observer`](Self::exit_observer), fault handlers wire
/// [`fault_observer`](Self::fault_observer).
#[derive(Clone)]
pub struct ShutdownReporter {
    exit: Arc<ExitReporter>,
    fault: Arc<FaultReporter>,
}

impl ShutdownReporter {
    /// Creates both reporters over the same sink.
    pub fn new(
        sink: Arc<dyn Sink>,
        resource_label: &str,
        runtime: Arc<dyn GcRuntime>,
        timeout: Duration,
    ) -> Self {
        ShutdownReporter {
            exit: Arc::new(ExitReporter::new(
                sink.clone(),
                resource_label,
                runtime,
                timeout,
            )),
            fault: Arc::new(FaultReporter::new(sink, resource_label, timeout)),
        }
    }

    /// Emits the shutdown record and flushes the sink, once.
    pub fn on_process_exit(&self) {
        self.exit.on_process_exit()
    }

    /// Emits a fatal record for `fault`.
    pub fn on_uncaught_fault(&self, thread_label: &str, fault: &(dyn Error + 'static)) {
        self.fault.on_uncaught_fault(thread_label, fault)
    }

    /// The exit capability.
    pub fn exit_observer(&self) -> Arc<dyn ExitObserver> {
        self.exit.clone()
    }

    /// The fault capability.
    pub fn fault_observer(&self) -> Arc<dyn FaultObserver> {
        self.fault.clone()
    }

    /// Whether the exit record has been emitted.
    pub fn has_exited(&self) -> bool {
        self.exit.has_exited()
    }
}

impl std::fmt::Debug for ShutdownReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownReporter")
            .field("resource_label", &self.exit.resource_label)
            .field("exited", &self.has_exited())
            .finish()
    }
}

/// Runs [`ExitObserver::on_process_exit`] when dropped.
///
/// Keep it alive for the whole of `main`.
#[must_use = "when the exit guard is dropped the process exit is reported \
              and the sink is flushed"]
pub struct ExitGuard(Arc<dyn ExitObserver>);

impl ExitGuard {
    /// Creates a guard around `observer`.
    pub fn new(observer: Arc<dyn ExitObserver>) -> Self {
        ExitGuard(observer)
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.on_process_exit();
    }
}

/// Flushes (and optionally closes) the sink when the scope ends.
struct FlushGuard<'a> {
    sink: &'a dyn Sink,
    timeout: Duration,
    close: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let sink = self.sink;
        let timeout = self.timeout;
        match contained(|| sink.flush(timeout)) {
            Ok(Ok(())) => gcstream_debug!("sink flushed"),
            Ok(Err(err)) => report_failure("failed to flush telemetry sink", &err),
            Err(_) => report_failure(
                "failed to flush telemetry sink",
                &SinkError::custom("flush panicked"),
            ),
        }
        if self.close {
            if let Ok(Err(err)) = contained(|| sink.close(timeout)) {
                report_failure("failed to close telemetry sink", &err);
            }
        }
    }
}

/// The fault's debug representation followed by its source chain.
fn fault_detail(fault: &(dyn Error + 'static)) -> String {
    let mut detail = format!("{:?}", fault);
    let mut source = fault.source();
    while let Some(cause) = source {
        detail.push_str(&format!("\ncaused by: {}", cause));
        source = cause.source();
    }
    detail
}

fn now_us() -> u64 {
    unix_millis(SystemTime::now()).saturating_mul(1000)
}
