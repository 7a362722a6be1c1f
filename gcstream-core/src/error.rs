use std::io;
use std::time::Duration;

use thiserror::Error;

/// An error reported by a [`Sink`](crate::Sink) or [`SinkFactory`](crate::SinkFactory).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    /// The sink for the given identity could not be opened or created.
    #[error("failed to open sink `{identity}`")]
    Open {
        /// The identity that was requested.
        identity: String,
        /// Why opening failed.
        #[source]
        source: io::Error,
    },
    /// The sink's queue is full and the record was dropped.
    #[error("sink queue is full")]
    QueueFull,
    /// The sink has been closed.
    #[error("sink is closed")]
    Closed,
    /// A flush did not complete in time.
    #[error("flush did not complete within {0:?}")]
    FlushTimeout(Duration),
    /// Writing to the underlying medium failed.
    #[error("i/o error")]
    Io(#[from] io::Error),
    /// A record could not be encoded.
    #[error("failed to encode record")]
    Encode(#[from] serde_json::Error),
    /// Any other failure.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates an error from a plain message.
    pub fn custom(message: impl Into<String>) -> Self {
        SinkError::Custom(message.into())
    }
}
