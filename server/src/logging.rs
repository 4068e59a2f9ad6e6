//! Structured logging init, matching the teacher's `tracing_subscriber::fmt`
//! setup: env-filter driven, defaulting to `info` for this crate family
//! rather than the global default of `warn`.

/// Initialize the global `tracing` subscriber. Safe to call more than once
/// per process (e.g. from tests) — later calls are ignored.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("bookreader=info".parse().unwrap()),
        )
        .with_target(false)
        .try_init();
}
