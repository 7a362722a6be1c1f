//! Installing a collector exactly once.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use gcstream_core::{
    gcstream_debug, utils, CumulativeGcState, GcRuntime, GcTelemetryProcessor, Sink,
};

use crate::defaults::apply_defaults;
use crate::listener::GcListener;
use crate::shutdown::{ExitGuard, ExitObserver, FaultObserver, ShutdownReporter};
use crate::{CollectorOptions, InstallError};

/// Where a [`CollectorLifecycle`] is in its one-way life.
///
/// A failed or panicking attempt never counts as an installation: the state
/// goes from `Installing` back to `Uninstalled` and a later call may retry.
/// Once `Installed`, the state never changes again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InstallState {
    /// Nothing installed yet, or the last attempt failed.
    Uninstalled = 0,
    /// One caller is performing the installation.
    Installing = 1,
    /// Installed; terminal.
    Installed = 2,
}

impl InstallState {
    fn from_u8(value: u8) -> InstallState {
        match value {
            1 => InstallState::Installing,
            2 => InstallState::Installed,
            _ => InstallState::Uninstalled,
        }
    }
}

/// Wires a runtime's GC sources to a sink, once.
///
/// The first successful [`install`](Self::install) opens the sink, subscribes
/// one listener per source, and registers the exit and fault reporters.
/// Every later call returns the same [`CollectorHandle`], whatever arguments
/// it passes. Concurrent callers racing the first install block until it
/// finishes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use gcstream::{CollectorLifecycle, CollectorOptions};
/// use gcstream_core::test::TestSink;
/// use gcstream_core::{ManualGcSource, SourceSet};
///
/// let young = Arc::new(ManualGcSource::new("G1 Young Generation"));
/// let sink = TestSink::new();
/// let lifecycle = CollectorLifecycle::new(
///     Arc::new(SourceSet::new().with_source(young.clone())),
///     CollectorOptions::new()
///         .with_sink_factory(sink.clone())
///         .with_panic_capture(false),
/// );
///
/// let handle = lifecycle.install("billing-worker", "gc.billing").unwrap();
/// young.emit(Default::default());
/// drop(handle.exit_guard());
///
/// assert_eq!(sink.fetch_and_clear_records().len(), 2);
/// ```
pub struct CollectorLifecycle {
    runtime: Arc<dyn GcRuntime>,
    options: CollectorOptions,
    state: AtomicU8,
    installed: Mutex<Option<CollectorHandle>>,
    state_changed: Condvar,
}

impl CollectorLifecycle {
    /// Creates an uninstalled lifecycle. Unset options are filled with
    /// [`apply_defaults`].
    pub fn new(runtime: Arc<dyn GcRuntime>, options: CollectorOptions) -> Self {
        let options = apply_defaults(options);
        if options.debug {
            utils::set_debug(true);
        }
        CollectorLifecycle {
            runtime,
            options,
            state: AtomicU8::new(InstallState::Uninstalled as u8),
            installed: Mutex::new(None),
            state_changed: Condvar::new(),
        }
    }

    /// The effective options.
    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    /// The current state.
    pub fn state(&self) -> InstallState {
        InstallState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The handle, once installed.
    pub fn handle(&self) -> Option<CollectorHandle> {
        self.lock_installed().clone()
    }

    /// Installs with the resource label and source identity from the options.
    pub fn install_default(&self) -> Result<CollectorHandle, InstallError> {
        let resource_label = self.options.resource_label.clone().unwrap_or_default();
        let source_identity = self.options.source_identity.clone().unwrap_or_default();
        self.install(&resource_label, &source_identity)
    }

    /// Installs the collector, or returns the handle of the installed one.
    ///
    /// A failure to open the sink is returned to the caller and leaves the
    /// lifecycle uninstalled, so a later call may try again.
    pub fn install(
        &self,
        resource_label: &str,
        source_identity: &str,
    ) -> Result<CollectorHandle, InstallError> {
        loop {
            let won = self
                .state
                .compare_exchange(
                    InstallState::Uninstalled as u8,
                    InstallState::Installing as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();

            if won {
                let mut attempt = InstallAttempt {
                    lifecycle: self,
                    installed: None,
                };
                let result = self.perform_install(resource_label, source_identity);
                if let Ok(ref handle) = result {
                    attempt.installed = Some(handle.clone());
                }
                drop(attempt);
                return result;
            }

            let mut installed = self.lock_installed();
            loop {
                if let Some(handle) = installed.as_ref() {
                    if handle.resource_label() != resource_label
                        || handle.source_identity() != source_identity
                    {
                        gcstream_debug!(
                            "collector already installed as {}/{}, ignoring {}/{}",
                            handle.resource_label(),
                            handle.source_identity(),
                            resource_label,
                            source_identity
                        );
                    }
                    return Ok(handle.clone());
                }
                if self.state() != InstallState::Installing {
                    // the previous attempt failed, race for the edge again
                    break;
                }
                installed = self
                    .state_changed
                    .wait(installed)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    fn perform_install(
        &self,
        resource_label: &str,
        source_identity: &str,
    ) -> Result<CollectorHandle, InstallError> {
        let factory = self
            .options
            .sink_factory
            .as_ref()
            .ok_or(InstallError::NoSinkFactory)?;
        let sink = factory
            .open(source_identity)
            .map_err(|source| InstallError::SinkOpen {
                identity: source_identity.to_owned(),
                source,
            })?;

        let state = Arc::new(CumulativeGcState::new());
        let reporter = ShutdownReporter::new(
            sink.clone(),
            resource_label,
            self.runtime.clone(),
            self.options.shutdown_timeout,
        );

        let mut sources = Vec::new();
        for source in self.runtime.sources() {
            let processor = GcTelemetryProcessor::new(state.clone(), resource_label);
            source.subscribe(Arc::new(GcListener::new(
                source.name(),
                processor,
                sink.clone(),
            )));
            gcstream_debug!("subscribed to GC source {}", source.name());
            sources.push(source.name().to_owned());
        }

        if self.options.capture_panics {
            #[cfg(feature = "panic")]
            crate::panic::register_panic_hook(reporter.fault_observer());
            #[cfg(not(feature = "panic"))]
            gcstream_debug!("panic capture requested but the `panic` feature is disabled");
        }

        gcstream_debug!(
            "GC collector installed: resource={}, source={}, gc.sources={}",
            resource_label,
            source_identity,
            sources.len()
        );

        Ok(CollectorHandle {
            inner: Arc::new(HandleInner {
                resource_label: resource_label.to_owned(),
                source_identity: source_identity.to_owned(),
                sink,
                state,
                sources,
                reporter,
            }),
        })
    }

    fn lock_installed(&self) -> MutexGuard<'_, Option<CollectorHandle>> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CollectorLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorLifecycle")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish()
    }
}

/// Publishes the outcome of an installation attempt and wakes waiters,
/// also when the attempt unwinds.
struct InstallAttempt<'a> {
    lifecycle: &'a CollectorLifecycle,
    installed: Option<CollectorHandle>,
}

impl Drop for InstallAttempt<'_> {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle;
        let mut installed = lifecycle.lock_installed();
        let next = match self.installed.take() {
            Some(handle) => {
                *installed = Some(handle);
                InstallState::Installed
            }
            None => InstallState::Uninstalled,
        };
        lifecycle.state.store(next as u8, Ordering::SeqCst);
        lifecycle.state_changed.notify_all();
    }
}

struct HandleInner {
    resource_label: String,
    source_identity: String,
    sink: Arc<dyn Sink>,
    state: Arc<CumulativeGcState>,
    sources: Vec<String>,
    reporter: ShutdownReporter,
}

/// An installed collector.
///
/// Cheap to clone; all clones refer to the same installation.
#[derive(Clone)]
pub struct CollectorHandle {
    inner: Arc<HandleInner>,
}

impl CollectorHandle {
    /// The label attached to every record.
    pub fn resource_label(&self) -> &str {
        &self.inner.resource_label
    }

    /// The identity the sink was opened with.
    pub fn source_identity(&self) -> &str {
        &self.inner.source_identity
    }

    /// The shared sink.
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.inner.sink
    }

    /// The cumulative GC time shared by all sources.
    pub fn state(&self) -> &Arc<CumulativeGcState> {
        &self.inner.state
    }

    /// Names of the sources that were subscribed.
    pub fn sources(&self) -> &[String] {
        &self.inner.sources
    }

    /// The exit and fault reporters.
    pub fn reporter(&self) -> &ShutdownReporter {
        &self.inner.reporter
    }

    /// The exit capability, for hosts with their own exit hook.
    pub fn exit_observer(&self) -> Arc<dyn ExitObserver> {
        self.inner.reporter.exit_observer()
    }

    /// The fault capability, for hosts with their own fault handler.
    pub fn fault_observer(&self) -> Arc<dyn FaultObserver> {
        self.inner.reporter.fault_observer()
    }

    /// A guard reporting process exit when dropped.
    pub fn exit_guard(&self) -> ExitGuard {
        ExitGuard::new(self.exit_observer())
    }

    /// Whether two handles refer to the same installation.
    pub fn ptr_eq(&self, other: &CollectorHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorHandle")
            .field("resource_label", &self.inner.resource_label)
            .field("source_identity", &self.inner.source_identity)
            .field("sources", &self.inner.sources)
            .finish()
    }
}
