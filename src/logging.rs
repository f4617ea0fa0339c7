use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber for the CLI and tests.
/// Only the first call takes effect.
pub fn init_tracing(enable_debug: bool) {
    // config.rs and some dependencies still log through the `log` facade
    let _ = tracing_log::LogTracer::init();

    // --debug overrides RUST_LOG
    let env_filter = if enable_debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
