use std::borrow::Cow;
use std::env;

use crate::CollectorOptions;

/// Source identity used when none is configured.
pub const DEFAULT_SOURCE_IDENTITY: &str = "gcstream.gc";

/// Fills unset options from the environment.
///
/// | option            | environment              | fallback                      |
/// |-------------------|--------------------------|-------------------------------|
/// | `resource_label`  | `GCSTREAM_RESOURCE_NAME` | `<pid>@<hostname>`            |
/// | `source_identity` | `GCSTREAM_SOURCE_NAME`   | [`DEFAULT_SOURCE_IDENTITY`]   |
/// | `debug`           | `GCSTREAM_DEBUG`         | `false`                       |
/// | `sink_factory`    | `GCSTREAM_OUTPUT_DIR`    | file sink in the working dir  |
pub fn apply_defaults(mut opts: CollectorOptions) -> CollectorOptions {
    if opts.resource_label.is_none() {
        opts.resource_label = non_empty_var("GCSTREAM_RESOURCE_NAME")
            .map(Cow::Owned)
            .or_else(|| Some(Cow::Owned(default_resource_label())));
    }
    if opts.source_identity.is_none() {
        opts.source_identity = non_empty_var("GCSTREAM_SOURCE_NAME")
            .map(Cow::Owned)
            .or(Some(Cow::Borrowed(DEFAULT_SOURCE_IDENTITY)));
    }
    if !opts.debug {
        opts.debug = non_empty_var("GCSTREAM_DEBUG")
            .map_or(false, |v| matches!(v.as_str(), "1" | "true" | "yes"));
    }
    #[cfg(feature = "file-sink")]
    {
        if opts.sink_factory.is_none() {
            opts.sink_factory = Some(std::sync::Arc::new(
                crate::sinks::FileSinkFactory::from_env(),
            ));
        }
    }
    opts
}

/// The label identifying this process: `<pid>@<hostname>`.
pub fn default_resource_label() -> String {
    format!(
        "{}@{}",
        std::process::id(),
        server_name().unwrap_or_else(|| "localhost".into())
    )
}

#[cfg(not(target_arch = "wasm32"))]
fn server_name() -> Option<String> {
    hostname::get().ok().and_then(|s| s.into_string().ok())
}

#[cfg(target_arch = "wasm32")]
fn server_name() -> Option<String> {
    None
}

pub(crate) fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
