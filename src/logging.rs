//! Logging bootstrap.

/// Initialize env_logger with millisecond timestamps, defaulting to `info`
/// when `RUST_LOG` is unset. Safe to call more than once; later calls are
/// no-ops.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
