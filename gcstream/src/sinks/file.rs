use std::fs::{self, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gcstream_core::{gcstream_debug, Sink, SinkError, SinkFactory, TelemetryRecord};

use super::SinkThread;
use crate::defaults::non_empty_var;

/// Appends records as JSON lines to a file.
pub struct FileSink {
    path: PathBuf,
    thread: SinkThread,
}

impl FileSink {
    /// Opens or creates the file at `path` in append mode.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let thread = SinkThread::new(&name, BufWriter::new(file))?;
        Ok(FileSink { path, thread })
    }

    /// The file records are appended to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn submit(&self, record: TelemetryRecord) -> Result<(), SinkError> {
        self.thread.send(record)
    }

    fn flush(&self, timeout: Duration) -> Result<(), SinkError> {
        self.thread.flush(timeout)
    }

    fn close(&self, timeout: Duration) -> Result<(), SinkError> {
        let flushed = self.thread.flush(timeout);
        if self.thread.shutdown(timeout) {
            flushed
        } else {
            Err(SinkError::FlushTimeout(timeout))
        }
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink").field("path", &self.path).finish()
    }
}

/// Opens a [`FileSink`] at `<directory>/<identity>.jsonl`.
#[derive(Clone, Debug)]
pub struct FileSinkFactory {
    directory: PathBuf,
}

impl FileSinkFactory {
    /// Creates a factory writing into `directory`, created on first open.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        FileSinkFactory {
            directory: directory.into(),
        }
    }

    /// Writes into `GCSTREAM_OUTPUT_DIR`, or the working directory.
    pub fn from_env() -> Self {
        Self::new(non_empty_var("GCSTREAM_OUTPUT_DIR").unwrap_or_else(|| ".".into()))
    }

    /// The file a given identity is written to.
    pub fn path_for(&self, identity: &str) -> PathBuf {
        let file_name: String = identity
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        self.directory.join(format!("{}.jsonl", file_name))
    }
}

impl SinkFactory for FileSinkFactory {
    fn open(&self, identity: &str) -> Result<Arc<dyn Sink>, SinkError> {
        let open_error = |source| SinkError::Open {
            identity: identity.to_owned(),
            source,
        };
        fs::create_dir_all(&self.directory).map_err(open_error)?;
        let path = self.path_for(identity);
        let sink = FileSink::open(&path).map_err(open_error)?;
        gcstream_debug!("opened file sink {}", path.display());
        Ok(Arc::new(sink))
    }
}
