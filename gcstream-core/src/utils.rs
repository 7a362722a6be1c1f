//! Diagnostic helpers shared by the gcstream crates.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Turns debug output of `gcstream_debug!` on or off.
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

/// Whether debug output is enabled.
pub fn is_debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

#[doc(hidden)]
#[cfg(not(feature = "debug-logs"))]
pub fn debug_print(args: fmt::Arguments<'_>) {
    if is_debug_enabled() {
        eprintln!("[gcstream] {}", args);
    }
}

#[doc(hidden)]
#[cfg(feature = "debug-logs")]
pub fn debug_print(args: fmt::Arguments<'_>) {
    log::debug!(target: "gcstream", "{}", args);
}

/// Reports a failure that has no recovery path.
///
/// This is the best-effort diagnostic channel: it always writes to stderr,
/// independent of debug mode, and never fails itself.
pub fn report_failure(context: &str, error: &dyn std::error::Error) {
    use std::io::Write;

    let mut line = format!("[gcstream] {}: {}", context, error);
    let mut source = error.source();
    while let Some(cause) = source {
        line.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    #[cfg(feature = "debug-logs")]
    log::warn!(target: "gcstream", "{}", line);
    let _ = writeln!(std::io::stderr().lock(), "{}", line);
}

/// Milliseconds since the Unix epoch, `0` if the clock is before it.
pub fn unix_millis(time: std::time::SystemTime) -> u64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn test_unix_millis() {
        assert_eq!(unix_millis(UNIX_EPOCH + Duration::from_millis(1500)), 1500);
        assert_eq!(unix_millis(UNIX_EPOCH - Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_report_failure_walks_sources() {
        let error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        report_failure("flush failed", &error);
    }
}
