//! This crate provides the core of gcstream, which turns the garbage
//! collection activity of a managed runtime into structured telemetry.
//!
//! `gcstream-core` is meant for authors bridging a runtime or a telemetry
//! backend. Applications that want a ready collector with a default sink and
//! panic reporting should use the `gcstream` crate instead.
//!
//! # Core Concepts
//!
//! A runtime reports each completed collection as a [`GcCycleEvent`]. The
//! [`GcTelemetryProcessor`] turns it into a [`TelemetryRecord`] carrying
//! per-pool before/after [`Snapshot`]s and the cycle's share of runtime spent
//! in GC, accumulated in a [`CumulativeGcState`] shared by all sources.
//!
//! The extension points are the [`Sink`] and [`SinkFactory`] traits on the
//! outbound side and the [`GcRuntime`], [`GcSource`] and [`CycleObserver`]
//! traits on the inbound side.
//!
//! ```
//! use std::sync::Arc;
//!
//! use gcstream_core::{CumulativeGcState, GcCycleEvent, GcTelemetryProcessor, MemoryPoolSample};
//!
//! let processor = GcTelemetryProcessor::new(Arc::new(CumulativeGcState::new()), "4242@build-host");
//! let event = GcCycleEvent {
//!     id: 1,
//!     collector_name: "G1 Young Generation".into(),
//!     action: "end of minor GC".into(),
//!     cause: "G1 Evacuation Pause".into(),
//!     start_time_ms: 950,
//!     end_time_ms: 1000,
//!     duration_ms: 50,
//!     ..Default::default()
//! }
//! .with_pool(
//!     MemoryPoolSample::new("G1 Eden Space", 0, 0, 100, 200),
//!     MemoryPoolSample::new("G1 Eden Space", 0, 0, 150, 220),
//! );
//!
//! let record = processor.process(&event);
//! assert_eq!(record.property("totalGcOverheadPct").unwrap().as_f64(), 5.0);
//! assert_eq!(record.snapshots.len(), 2);
//! ```
//!
//! # Features
//!
//! - `test`: Enables the [`test`] module with a collecting sink.
//! - `debug-logs`: Routes internal debug output through the `log` crate.

#![doc(html_root_url = "https://docs.rs/gcstream-core")]
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod macros;

mod error;
pub mod processor;
pub mod protocol;
mod sink;
pub mod source;
mod state;
#[cfg(feature = "test")]
pub mod test;
pub mod utils;

pub use crate::error::SinkError;
pub use crate::processor::GcTelemetryProcessor;
pub use crate::protocol::{
    GcCycleEvent, Level, MemoryPoolSample, OpType, Property, Snapshot, TelemetryRecord, Timing,
    Value, ValueType,
};
pub use crate::sink::{Sink, SinkFactory};
pub use crate::source::{CycleObserver, GcRuntime, GcSource, ManualGcSource, SourceSet};
pub use crate::state::CumulativeGcState;
