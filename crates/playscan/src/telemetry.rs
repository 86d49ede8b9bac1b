//! Process-wide logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "playscan=info";

/// Installs the global subscriber and bridges `log` records into it.
///
/// `RUST_LOG` overrides the default filter. Calling this twice returns an
/// error instead of panicking.
pub fn init(json: bool, verbose: bool) -> Result<(), String> {
    let default_filter = if verbose { "playscan=debug" } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    tracing_log::LogTracer::init().map_err(|e| format!("log bridge: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| format!("subscriber: {}", e))
}
