//! `tracing-subscriber` setup for binaries and demos embedding the loop.

use tracing_subscriber::EnvFilter;

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a human-readable fmt subscriber. `RUST_LOG` wins over `verbose`.
///
/// Returns false if a global subscriber was already installed.
pub fn init(verbose: bool) -> bool {
    init_with_format(verbose, LogFormat::Pretty)
}

pub fn init_with_format(verbose: bool, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_target(false);

    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
