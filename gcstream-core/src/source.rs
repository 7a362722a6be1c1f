//! The inbound side: where collection cycles come from.
//!
//! A managed runtime exposes one [`GcSource`] per collector (young and old
//! generation collectors usually being separate sources). Each source may
//! deliver on its own thread, so observers must be safe to call
//! concurrently.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::protocol::GcCycleEvent;

/// Receives collection cycles from a source.
pub trait CycleObserver: Send + Sync {
    /// Called once per completed cycle, on the source's dispatch thread.
    fn on_cycle(&self, event: GcCycleEvent);
}

impl<F> CycleObserver for F
where
    F: Fn(GcCycleEvent) + Send + Sync,
{
    fn on_cycle(&self, event: GcCycleEvent) {
        self(event)
    }
}

/// A single notification source, typically one collector.
pub trait GcSource: Send + Sync {
    /// Name of the source, e.g. `G1 Old Generation`.
    fn name(&self) -> &str;

    /// Attaches an observer that receives every subsequent cycle.
    fn subscribe(&self, observer: Arc<dyn CycleObserver>);
}

/// The runtime whose collectors are observed.
pub trait GcRuntime: Send + Sync {
    /// Every notification source the runtime currently exposes.
    fn sources(&self) -> Vec<Arc<dyn GcSource>>;

    /// Time since the runtime started, if the runtime knows it.
    fn uptime(&self) -> Option<Duration> {
        None
    }
}

/// A source that is fed by hand.
///
/// Hosts bridging a runtime's native notifications call
/// [`emit`](Self::emit) from whatever thread the runtime delivers on.
pub struct ManualGcSource {
    name: String,
    observers: RwLock<Vec<Arc<dyn CycleObserver>>>,
}

impl ManualGcSource {
    /// Creates a source without observers.
    pub fn new(name: impl Into<String>) -> Self {
        ManualGcSource {
            name: name.into(),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Delivers a cycle to every observer in subscription order.
    pub fn emit(&self, event: GcCycleEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some((last, rest)) = observers.split_last() {
            for observer in rest {
                observer.on_cycle(event.clone());
            }
            last.on_cycle(event);
        }
    }

    /// Number of attached observers.
    pub fn subscriber_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl GcSource for ManualGcSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self, observer: Arc<dyn CycleObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}

impl fmt::Debug for ManualGcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualGcSource")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A runtime made of a fixed set of sources.
#[derive(Clone, Default)]
pub struct SourceSet {
    sources: Vec<Arc<dyn GcSource>>,
    uptime: Option<fn() -> Duration>,
}

impl SourceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source.
    #[must_use]
    pub fn with_source<S: GcSource + 'static>(mut self, source: Arc<S>) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the function reporting runtime uptime.
    #[must_use]
    pub fn with_uptime(mut self, uptime: fn() -> Duration) -> Self {
        self.uptime = Some(uptime);
        self
    }
}

impl GcRuntime for SourceSet {
    fn sources(&self) -> Vec<Arc<dyn GcSource>> {
        self.sources.clone()
    }

    fn uptime(&self) -> Option<Duration> {
        self.uptime.map(|f| f())
    }
}

impl fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSet")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
