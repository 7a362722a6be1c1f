use std::sync::Arc;
use std::time::Duration;

use crate::error::SinkError;
use crate::protocol::TelemetryRecord;

/// The destination of telemetry records.
///
/// One sink is shared by every listener of a collector and by the shutdown
/// path, so all methods must be safe to call concurrently. A flush running
/// alongside an in-flight `submit` must still succeed; whether that record
/// is included is up to the implementation.
pub trait Sink: Send + Sync + 'static {
    /// Hands a record to the sink.
    ///
    /// Implementations should not block on i/o here.
    fn submit(&self, record: TelemetryRecord) -> Result<(), SinkError>;

    /// Drains pending records, waiting at most `timeout`.
    fn flush(&self, timeout: Duration) -> Result<(), SinkError>;

    /// Drains pending records and releases the sink.
    ///
    /// Records submitted after closing may be rejected.
    fn close(&self, timeout: Duration) -> Result<(), SinkError> {
        self.flush(timeout)
    }
}

/// Opens the sink for a source identity.
pub trait SinkFactory: Send + Sync {
    /// Opens or creates the sink identified by `identity`.
    fn open(&self, identity: &str) -> Result<Arc<dyn Sink>, SinkError>;
}

impl<F> SinkFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn Sink>, SinkError> + Send + Sync,
{
    fn open(&self, identity: &str) -> Result<Arc<dyn Sink>, SinkError> {
        (*self)(identity)
    }
}

impl<S: Sink> SinkFactory for Arc<S> {
    fn open(&self, _identity: &str) -> Result<Arc<dyn Sink>, SinkError> {
        Ok(self.clone())
    }
}
