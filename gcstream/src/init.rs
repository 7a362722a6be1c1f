use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gcstream_core::{gcstream_debug, GcRuntime};

use crate::lifecycle::{CollectorHandle, CollectorLifecycle};
use crate::shutdown::ExitGuard;
use crate::{AgentOptions, CollectorOptions, InstallError};

/// Helper struct that is returned from `init`.
///
/// When this is dropped the process exit is reported and the sink is flushed
/// and closed, bounded by the configured shutdown timeout.
#[must_use = "when the init guard is dropped the process exit is reported and the sink is \
              closed. If you do want to ignore this use mem::forget on it."]
pub struct InitGuard {
    lifecycle: CollectorLifecycle,
    handle: CollectorHandle,
    _exit: ExitGuard,
}

impl InitGuard {
    /// The installed collector.
    pub fn handle(&self) -> &CollectorHandle {
        &self.handle
    }

    /// The lifecycle the collector was installed through.
    pub fn lifecycle(&self) -> &CollectorLifecycle {
        &self.lifecycle
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        gcstream_debug!("dropping init guard -> reporting process exit");
    }
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs a collector over `runtime` and returns a guard reporting
/// process exit when dropped.
///
/// The resource label and source identity come from `options`, filled in
/// from the environment where unset.
///
/// `init` succeeds at most once per process; later calls fail with
/// [`InstallError::AlreadyInitialized`] and leave the running collector
/// alone, even after its guard was dropped. A failed `init` may be retried.
/// Use [`CollectorLifecycle`] directly to manage installations explicitly.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use gcstream::CollectorOptions;
/// use gcstream_core::test::TestSink;
/// use gcstream_core::{ManualGcSource, SourceSet};
///
/// let young = Arc::new(ManualGcSource::new("G1 Young Generation"));
/// let sink = TestSink::new();
/// let guard = gcstream::init(
///     Arc::new(SourceSet::new().with_source(young.clone())),
///     CollectorOptions::new()
///         .with_resource_label("billing-worker")
///         .with_sink_factory(sink.clone())
///         .with_panic_capture(false),
/// )
/// .unwrap();
/// assert_eq!(guard.handle().resource_label(), "billing-worker");
///
/// drop(guard);
/// assert_eq!(sink.fetch_and_clear_records()[0].name, "process-shutdown");
/// ```
pub fn init(
    runtime: Arc<dyn GcRuntime>,
    options: CollectorOptions,
) -> Result<InitGuard, InstallError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        gcstream_debug!("gcstream already initialized, ignoring init");
        return Err(InstallError::AlreadyInitialized);
    }
    let lifecycle = CollectorLifecycle::new(runtime, options);
    let handle = match lifecycle.install_default() {
        Ok(handle) => handle,
        Err(err) => {
            INITIALIZED.store(false, Ordering::SeqCst);
            return Err(err);
        }
    };
    gcstream_debug!(
        "enabled GC telemetry for {} as {}",
        handle.resource_label(),
        handle.source_identity()
    );
    Ok(InitGuard {
        _exit: handle.exit_guard(),
        lifecycle,
        handle,
    })
}

/// Like [`init`], with the resource label and source identity taken from an
/// agent option string such as `"billing-worker,gc.billing"`.
///
/// Empty or missing fields fall back to `options` and the environment.
pub fn init_with_agent_options(
    runtime: Arc<dyn GcRuntime>,
    options: CollectorOptions,
    agent_options: &str,
) -> Result<InitGuard, InstallError> {
    init(runtime, AgentOptions::parse(agent_options).apply_to(options))
}
