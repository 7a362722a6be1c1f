use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gcstream_core::utils::report_failure;
use gcstream_core::{gcstream_debug, SinkError, TelemetryRecord};

const QUEUE_SIZE: usize = 64;
const DROP_TIMEOUT: Duration = Duration::from_secs(2);

enum Task {
    Write(TelemetryRecord),
    Flush(SyncSender<io::Result<()>>),
    Shutdown(SyncSender<()>),
}

/// Writes records as JSON lines on a background thread.
///
/// Submitting never blocks; when the queue is full the record is rejected.
pub struct SinkThread {
    sender: SyncSender<Task>,
    shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SinkThread {
    /// Spawns the worker writing to `writer`.
    pub fn new<W>(name: &str, mut writer: W) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (sender, receiver) = sync_channel(QUEUE_SIZE);
        let handle = thread::Builder::new()
            .name(format!("gcstream-sink-{}", name))
            .spawn(move || {
                for task in receiver.into_iter() {
                    match task {
                        Task::Write(record) => {
                            if let Err(err) = write_record(&mut writer, &record) {
                                report_failure("failed to write telemetry record", &err);
                            }
                        }
                        Task::Flush(done) => {
                            done.send(writer.flush()).ok();
                        }
                        Task::Shutdown(done) => {
                            if let Err(err) = writer.flush() {
                                report_failure("failed to flush telemetry sink", &err);
                            }
                            done.send(()).ok();
                            return;
                        }
                    }
                }
            })?;

        Ok(SinkThread {
            sender,
            shutdown: AtomicBool::new(false),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues a record for writing.
    pub fn send(&self, record: TelemetryRecord) -> Result<(), SinkError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        self.sender
            .try_send(Task::Write(record))
            .map_err(|err| match err {
                TrySendError::Full(_) => SinkError::QueueFull,
                TrySendError::Disconnected(_) => SinkError::Closed,
            })
    }

    /// Waits until everything queued so far is written and flushed.
    pub fn flush(&self, timeout: Duration) -> Result<(), SinkError> {
        let (done, receiver) = sync_channel(1);
        self.sender
            .send(Task::Flush(done))
            .map_err(|_| SinkError::Closed)?;
        match receiver.recv_timeout(timeout) {
            Ok(result) => result.map_err(SinkError::from),
            Err(RecvTimeoutError::Timeout) => Err(SinkError::FlushTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SinkError::Closed),
        }
    }

    /// Drains the queue and stops the worker, waiting at most `timeout`.
    ///
    /// Returns whether the worker finished in time; a worker that did not is
    /// left to finish on its own. Later calls do nothing and return `true`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let (done, finished) = sync_channel(1);
        let mut task = Task::Shutdown(done);
        loop {
            match self.sender.try_send(task) {
                Ok(()) => break,
                Err(TrySendError::Disconnected(_)) => break,
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return self.abandon(timeout);
                    }
                    task = returned;
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match finished.recv_timeout(remaining) {
            Err(RecvTimeoutError::Timeout) => return self.abandon(timeout),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                gcstream_debug!("sink worker panicked");
            }
        }
        true
    }

    fn abandon(&self, timeout: Duration) -> bool {
        report_failure(
            "telemetry sink worker did not stop",
            &SinkError::FlushTimeout(timeout),
        );
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        false
    }
}

impl Drop for SinkThread {
    fn drop(&mut self) {
        self.shutdown(DROP_TIMEOUT);
    }
}

fn write_record<W: Write>(writer: &mut W, record: &TelemetryRecord) -> Result<(), SinkError> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc, Mutex};

    use gcstream_core::{Level, OpType};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "broken pipe"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "broken pipe"))
        }
    }

    #[test]
    fn test_writes_json_lines() {
        let buffer = SharedBuffer::default();
        let thread = SinkThread::new("test", buffer.clone()).unwrap();
        thread
            .send(TelemetryRecord::new("first", Level::Trace, OpType::Clear))
            .unwrap();
        thread
            .send(TelemetryRecord::new("second", Level::Trace, OpType::Clear))
            .unwrap();
        thread.flush(Duration::from_secs(5)).unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let names: Vec<String> = written
            .lines()
            .map(|line| {
                let record: TelemetryRecord = serde_json::from_str(line).unwrap();
                record.name
            })
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_write_failures_do_not_stop_the_worker() {
        let thread = SinkThread::new("broken", BrokenWriter).unwrap();
        thread
            .send(TelemetryRecord::new("lost", Level::Trace, OpType::Clear))
            .unwrap();
        assert!(matches!(
            thread.flush(Duration::from_secs(5)),
            Err(SinkError::Io(_))
        ));
        thread
            .send(TelemetryRecord::new("also lost", Level::Trace, OpType::Clear))
            .unwrap();
    }

    #[test]
    fn test_send_after_shutdown() {
        let thread = SinkThread::new("closed", SharedBuffer::default()).unwrap();
        assert!(thread.shutdown(Duration::from_secs(5)));
        assert!(thread.shutdown(Duration::from_secs(5)));
        assert!(matches!(
            thread.send(TelemetryRecord::new("late", Level::Trace, OpType::Clear)),
            Err(SinkError::Closed)
        ));
        assert!(matches!(
            thread.flush(Duration::from_millis(10)),
            Err(SinkError::Closed)
        ));
    }

    struct StuckWriter(Mutex<mpsc::Receiver<()>>);

    impl Write for StuckWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            // blocks until the test lets go
            let _ = self.0.lock().unwrap().recv();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_shutdown_is_bounded_by_a_stuck_writer() {
        let (release, stuck) = mpsc::channel();
        let thread = SinkThread::new("stuck", StuckWriter(Mutex::new(stuck))).unwrap();
        thread
            .send(TelemetryRecord::new("stuck", Level::Trace, OpType::Clear))
            .unwrap();

        let started = Instant::now();
        assert!(!thread.shutdown(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            thread.send(TelemetryRecord::new("late", Level::Trace, OpType::Clear)),
            Err(SinkError::Closed)
        ));
        drop(release);
    }
}
