use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gcstream_core::SinkFactory;

/// Configuration for a collector.
///
/// Unset values are filled in by [`apply_defaults`](crate::apply_defaults)
/// from the environment when the collector is created.
///
/// # Examples
///
/// ```
/// let _options = gcstream::CollectorOptions::new()
///     .with_resource_label("billing-worker")
///     .with_debug(true);
/// ```
#[derive(Clone)]
pub struct CollectorOptions {
    /// Label attached to every record, identifying the producing process.
    ///
    /// Defaults to `GCSTREAM_RESOURCE_NAME` or `<pid>@<hostname>`.
    pub resource_label: Option<Cow<'static, str>>,
    /// Identity under which the sink is opened.
    ///
    /// Defaults to `GCSTREAM_SOURCE_NAME` or
    /// [`DEFAULT_SOURCE_IDENTITY`](crate::DEFAULT_SOURCE_IDENTITY).
    pub source_identity: Option<Cow<'static, str>>,
    /// Enables debug mode.
    ///
    /// In debug mode diagnostic information is printed to stderr.
    pub debug: bool,
    /// The factory opening the sink.
    ///
    /// Defaults to a [`FileSinkFactory`](crate::sinks::FileSinkFactory) when
    /// the `file-sink` feature is enabled.
    pub sink_factory: Option<Arc<dyn SinkFactory>>,
    /// How long flushes at shutdown or after a fault may take.
    pub shutdown_timeout: Duration,
    /// Report panics as uncaught faults.
    pub capture_panics: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        CollectorOptions {
            resource_label: None,
            source_identity: None,
            debug: false,
            sink_factory: None,
            shutdown_timeout: Duration::from_secs(2),
            capture_panics: true,
        }
    }
}

impl CollectorOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resource label.
    #[must_use]
    pub fn with_resource_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.resource_label = Some(label.into());
        self
    }

    /// Sets the source identity.
    #[must_use]
    pub fn with_source_identity(mut self, identity: impl Into<Cow<'static, str>>) -> Self {
        self.source_identity = Some(identity.into());
        self
    }

    /// Enables or disables debug output.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the sink factory.
    #[must_use]
    pub fn with_sink_factory<F: SinkFactory + 'static>(mut self, factory: F) -> Self {
        self.sink_factory = Some(Arc::new(factory));
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enables or disables panic reporting.
    #[must_use]
    pub fn with_panic_capture(mut self, enabled: bool) -> Self {
        self.capture_panics = enabled;
        self
    }
}

impl fmt::Debug for CollectorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorOptions")
            .field("resource_label", &self.resource_label)
            .field("source_identity", &self.source_identity)
            .field("debug", &self.debug)
            .field("sink_factory", &self.sink_factory.as_ref().map(|_| ".."))
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("capture_panics", &self.capture_panics)
            .finish()
    }
}

/// Options passed on an agent-style command line.
///
/// The format is `resourceLabel,sourceIdentity`. Either field may be empty or
/// missing, in which case that value keeps its default.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentOptions {
    /// The resource label, if given.
    pub resource_label: Option<String>,
    /// The source identity, if given.
    pub source_identity: Option<String>,
}

impl AgentOptions {
    /// Parses an option string. Fields beyond the second are ignored.
    pub fn parse(options: &str) -> Self {
        let mut fields = options
            .split(',')
            .map(str::trim)
            .map(|field| Some(field).filter(|f| !f.is_empty()).map(str::to_owned));
        AgentOptions {
            resource_label: fields.next().flatten(),
            source_identity: fields.next().flatten(),
        }
    }

    /// Overrides the values in `options` that were given here.
    pub fn apply_to(self, mut options: CollectorOptions) -> CollectorOptions {
        if let Some(label) = self.resource_label {
            options.resource_label = Some(Cow::Owned(label));
        }
        if let Some(identity) = self.source_identity {
            options.source_identity = Some(Cow::Owned(identity));
        }
        options
    }
}

impl From<&str> for AgentOptions {
    fn from(options: &str) -> Self {
        AgentOptions::parse(options)
    }
}
