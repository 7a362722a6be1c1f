//! This crate turns the garbage-collection activity of a managed runtime into
//! a stream of structured telemetry records: one record per collection cycle
//! with per-pool memory snapshots and the share of runtime spent in GC, plus a
//! final record at process exit and one per uncaught fault.
//!
//! # Quickstart
//!
//! A runtime bridge exposes its collectors as [`GcSource`]s through a
//! [`GcRuntime`]. The [`init`] function installs a collector over it, opening
//! the sink and subscribing a listener to every source. It returns a guard that
//! reports the process exit and flushes the sink when dropped; keep it alive
//! for the whole of `main`.
//!
//! ```
//! use std::sync::Arc;
//!
//! use gcstream::{CollectorOptions, GcCycleEvent, ManualGcSource, SourceSet};
//!
//! let dir = std::env::temp_dir().join(format!("gcstream-doc-{}", std::process::id()));
//! let young = Arc::new(ManualGcSource::new("G1 Young Generation"));
//! let _guard = gcstream::init(
//!     Arc::new(SourceSet::new().with_source(young.clone())),
//!     CollectorOptions::new()
//!         .with_resource_label("billing-worker")
//!         .with_sink_factory(gcstream::sinks::FileSinkFactory::new(&dir))
//!         .with_panic_capture(false),
//! )
//! .unwrap();
//!
//! young.emit(GcCycleEvent {
//!     id: 1,
//!     action: "end of minor GC".into(),
//!     duration_ms: 12,
//!     end_time_ms: 4000,
//!     ..Default::default()
//! });
//! ```
//!
//! For finer control over installation use [`CollectorLifecycle`] directly.
//!
//! # Minimal API
//!
//! Authors of runtime bridges or of custom sinks only need the traits and the
//! processor, which live in the [`gcstream-core`] crate and are re-exported
//! here.
//!
//! [`gcstream-core`]: https://crates.io/crates/gcstream-core
//!
//! # Features
//!
//! Default features:
//!
//! * `panic`: Reports panics as uncaught faults.
//! * `file-sink`: Enables [`sinks::FileSinkFactory`], used when no sink
//!   factory is configured.
//!
//! Additional features:
//!
//! * `test`: Enables testing support.
//! * `debug-logs`: Uses the `log` crate for internal logging.

#![doc(html_root_url = "https://docs.rs/gcstream")]
#![cfg_attr(doc_cfg, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod defaults;
mod error;
mod init;
mod lifecycle;
mod listener;
mod options;
mod shutdown;

#[cfg(feature = "panic")]
#[cfg_attr(doc_cfg, doc(cfg(feature = "panic")))]
pub mod panic;
pub mod sinks;

// re-export from core
#[doc(inline)]
pub use gcstream_core::*;

// added public API
pub use crate::defaults::{apply_defaults, default_resource_label, DEFAULT_SOURCE_IDENTITY};
pub use crate::error::InstallError;
pub use crate::init::{init, init_with_agent_options, InitGuard};
pub use crate::lifecycle::{CollectorHandle, CollectorLifecycle, InstallState};
pub use crate::listener::GcListener;
pub use crate::options::{AgentOptions, CollectorOptions};
pub use crate::shutdown::{
    ExitGuard, ExitObserver, ExitReporter, FaultObserver, FaultReporter, ShutdownReporter,
    FAULT_RECORD_PREFIX, SHUTDOWN_RECORD,
};
