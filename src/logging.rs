// logging setup - stderr so stdout stays clean for query output

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over the default `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
