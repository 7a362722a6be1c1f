//! The provided sinks.
//!
//! The `file-sink` feature turns on [`FileSink`], which appends one JSON
//! document per record to a file named after the source identity.

#[cfg(feature = "file-sink")]
mod file;
#[cfg(feature = "file-sink")]
mod thread;

#[cfg(feature = "file-sink")]
pub use self::file::{FileSink, FileSinkFactory};
#[cfg(feature = "file-sink")]
pub use self::thread::SinkThread;
