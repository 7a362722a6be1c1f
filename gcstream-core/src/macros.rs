/// Prints a diagnostic line when debug mode is enabled.
///
/// With the `debug-logs` feature the line goes to the `log` crate under the
/// `gcstream` target instead of stderr.
#[macro_export]
#[doc(hidden)]
macro_rules! gcstream_debug {
    ($($arg:tt)*) => {
        $crate::utils::debug_print(format_args!($($arg)*))
    };
}
