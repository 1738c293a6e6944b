use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CLASS_SHADE_LOG";

/// Logs go to stderr so stdout stays parseable JSON.
///
/// `CLASS_SHADE_LOG` takes an `EnvFilter` directive and wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
