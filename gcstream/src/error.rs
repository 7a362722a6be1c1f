use gcstream_core::SinkError;
use thiserror::Error;

/// Why a collector could not be installed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// The sink for the source identity could not be opened.
    #[error("failed to open telemetry sink for source `{identity}`")]
    SinkOpen {
        /// The source identity the sink was requested for.
        identity: String,
        /// The underlying sink error.
        #[source]
        source: SinkError,
    },
    /// No sink factory was configured and none is compiled in.
    #[error("no sink factory configured")]
    NoSinkFactory,
    /// `init` already installed a collector in this process.
    #[error("gcstream is already initialized")]
    AlreadyInitialized,
}
