//! Logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber on stderr. `RUST_LOG` wins over `default_level`.
///
/// Stdout stays free for command output such as a recording printed by
/// `record stop`.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter(default_level))
        .try_init();
}

/// Subscriber for test binaries, captured per test by libtest.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_test(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(filter(default_level))
        .try_init();
}
