use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging with environment filter.
/// Set VKGL_LOG=debug (or trace, info, warn, error) for verbosity control;
/// replay opcode tracing additionally needs `trace_opcodes` in the config.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("VKGL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt().with_env_filter(filter).with_target(true).init();
}
