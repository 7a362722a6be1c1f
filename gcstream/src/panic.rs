//! Reports panics as uncaught faults.
//!
//! The hook is installed once per process and chained in front of the
//! previously registered panic hook, which still runs afterwards. It reports
//! to the observer of the most recent installation.
//!
//! Panics raised while a sink call is being contained, or while a panic is
//! already being reported on the same thread, are not reported.

use std::cell::Cell;
use std::error::Error;
use std::fmt;
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Once, PoisonError, RwLock};
use std::thread;

use backtrace::Backtrace;
use gcstream_core::gcstream_debug;

use crate::listener::is_contained;
use crate::shutdown::FaultObserver;

static INIT: Once = Once::new();
static OBSERVER: RwLock<Option<Arc<dyn FaultObserver>>> = RwLock::new(None);

thread_local! {
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// A panic, as an error.
pub struct PanicFault {
    message: String,
    location: Option<String>,
    backtrace: Backtrace,
}

impl PanicFault {
    /// Captures the panic described by `info`, with the current backtrace.
    pub fn from_panic_info(info: &PanicHookInfo<'_>) -> Self {
        PanicFault {
            message: message_from_panic_info(info).to_owned(),
            location: info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
            backtrace: Backtrace::new(),
        }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the panic was raised, as `file:line:column`.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

impl fmt::Display for PanicFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for PanicFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(ref location) => writeln!(f, "panicked at {}: {}", location, self.message)?,
            None => writeln!(f, "panicked: {}", self.message)?,
        }
        write!(f, "{:?}", self.backtrace)
    }
}

impl Error for PanicFault {}

/// Extract the message of a panic.
pub fn message_from_panic_info<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    match info.payload().downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

/// Reports one panic to `observer`.
///
/// Does nothing for panics raised inside a contained sink call or while this
/// thread is already reporting a panic.
pub fn panic_handler(observer: &dyn FaultObserver, info: &PanicHookInfo<'_>) {
    if is_contained() {
        gcstream_debug!("panic inside a contained sink call, not reported");
        return;
    }
    if REPORTING.with(|flag| flag.replace(true)) {
        return;
    }
    let current = thread::current();
    let label = current.name().unwrap_or("unnamed");
    gcstream_debug!("panic detected on thread {}: {}", label, message_from_panic_info(info));
    observer.on_uncaught_fault(label, &PanicFault::from_panic_info(info));
    REPORTING.with(|flag| flag.set(false));
}

/// Routes panics to `observer`.
///
/// The first call chains the process panic hook; later calls only replace
/// the observer.
pub fn register_panic_hook(observer: Arc<dyn FaultObserver>) {
    *OBSERVER.write().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    INIT.call_once(|| {
        gcstream_debug!("installing panic hook (one-time setup)");
        let next = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let observer = OBSERVER
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(observer) = observer {
                panic_handler(&*observer, info);
            }
            next(info);
        }));
    });
}

