//! Logger bootstrap shared by the adapter and the language server.
//!
//! Both binaries talk their protocol over stdout (at least in stdio mode),
//! so log records always go to stderr.

use env_logger::{Builder, Env, Target};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Install the global logger. Calling it twice is harmless, the second
/// call is ignored.
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER))
        .target(Target::Stderr)
        .format_timestamp_millis()
        .try_init();
}
