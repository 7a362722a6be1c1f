use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use gcstream_core::utils::report_failure;
use gcstream_core::{
    gcstream_debug, CycleObserver, GcCycleEvent, GcTelemetryProcessor, Sink, SinkError,
    TelemetryRecord,
};

/// Reports every cycle of one source to the shared sink.
///
/// Runs on the source's dispatch thread. Neither a failing nor a panicking
/// sink takes that thread down; the record is dropped and the failure goes
/// to the diagnostic channel.
pub struct GcListener {
    source_name: String,
    processor: GcTelemetryProcessor,
    sink: Arc<dyn Sink>,
}

impl GcListener {
    /// Creates a listener for the source named `source_name`.
    pub fn new(
        source_name: impl Into<String>,
        processor: GcTelemetryProcessor,
        sink: Arc<dyn Sink>,
    ) -> Self {
        GcListener {
            source_name: source_name.into(),
            processor,
            sink,
        }
    }

    /// Name of the observed source.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
}

impl CycleObserver for GcListener {
    fn on_cycle(&self, event: GcCycleEvent) {
        let record = self.processor.process(&event);
        let context = format!(
            "failed to report GC cycle {} of {}",
            event.id, self.source_name
        );
        submit_contained(&*self.sink, record, &context);
    }
}

impl std::fmt::Debug for GcListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcListener")
            .field("source_name", &self.source_name)
            .field("processor", &self.processor)
            .finish()
    }
}

thread_local! {
    static CONTAINING: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f`, catching any panic it raises.
///
/// While `f` runs the current thread is marked, so the panic hook does not
/// report panics that are about to be caught here.
pub(crate) fn contained<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    let outer = CONTAINING.with(|flag| flag.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CONTAINING.with(|flag| flag.set(outer));
    result
}

/// Whether the current thread is inside [`contained`].
#[cfg_attr(not(feature = "panic"), allow(dead_code))]
pub(crate) fn is_contained() -> bool {
    CONTAINING.with(Cell::get)
}

/// Submits a record, containing errors and panics.
///
/// Returns whether the sink accepted the record.
pub(crate) fn submit_contained(sink: &dyn Sink, record: TelemetryRecord, context: &str) -> bool {
    match contained(|| sink.submit(record)) {
        Ok(Ok(())) => true,
        Ok(Err(SinkError::Closed)) => {
            gcstream_debug!("{}: sink is closed", context);
            false
        }
        Ok(Err(err)) => {
            report_failure(context, &err);
            false
        }
        Err(_) => {
            report_failure(context, &SinkError::custom("sink panicked"));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use gcstream_core::processor::names;
    use gcstream_core::test::TestSink;
    use gcstream_core::{CumulativeGcState, Value};

    use super::*;

    fn listener(sink: Arc<TestSink>) -> GcListener {
        let processor = GcTelemetryProcessor::new(Arc::new(CumulativeGcState::new()), "res");
        GcListener::new("G1 Young Generation", processor, sink)
    }

    #[test]
    fn test_cycle_is_submitted() {
        let sink = TestSink::new();
        let listener = listener(sink.clone());
        listener.on_cycle(GcCycleEvent {
            id: 9,
            duration_ms: 4,
            end_time_ms: 400,
            ..Default::default()
        });

        let records = sink.fetch_and_clear_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].property(names::GC_ID), Some(Value::Int(9)));
    }

    #[test]
    fn test_failed_submit_keeps_counting() {
        let sink = TestSink::new();
        let listener = listener(sink.clone());

        sink.fail_submits(true);
        listener.on_cycle(GcCycleEvent {
            duration_ms: 10,
            end_time_ms: 100,
            ..Default::default()
        });
        sink.fail_submits(false);
        listener.on_cycle(GcCycleEvent {
            duration_ms: 10,
            end_time_ms: 200,
            ..Default::default()
        });

        let records = sink.fetch_and_clear_records();
        assert_eq!(sink.submit_count(), 2);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].property(names::TOTAL_GC_DURATION_MS),
            Some(Value::Int(20))
        );
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let sink = TestSink::new();
        let listener = listener(sink.clone());

        sink.panic_on_submits(true);
        listener.on_cycle(GcCycleEvent::default());
        assert_eq!(sink.submit_count(), 1);
        assert!(sink.fetch_and_clear_records().is_empty());
    }

    #[test]
    fn test_contained_marks_the_thread() {
        assert!(!is_contained());
        assert_eq!(contained(is_contained).ok(), Some(true));
        assert!(contained(|| panic!("sink exploded")).is_err());
        assert!(!is_contained());

        let nested = contained(|| {
            let _ = contained(|| ());
            is_contained()
        });
        assert_eq!(nested.ok(), Some(true));
    }
}
