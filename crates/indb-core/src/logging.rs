//! Logging setup and segment prefixes.
//!
//! Native hosts install a `tracing` subscriber here. Browser builds log
//! through an observer instead and never install one.

#[cfg(not(target_arch = "wasm32"))]
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber for a native host.
///
/// `RUST_LOG` wins over `default_filter`. Returns `false` when a subscriber
/// was already installed, in which case nothing changes.
#[cfg(not(target_arch = "wasm32"))]
pub fn init(default_filter: &str) -> bool {
    install(default_filter, false)
}

/// Route store events through the test harness' captured writer.
///
/// Safe to call from every test; only the first call installs a subscriber.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_for_tests() {
    install("debug", true);
}

#[cfg(not(target_arch = "wasm32"))]
fn install(default_filter: &str, test_writer: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let layer = fmt::layer().compact().with_target(false);

    if test_writer {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_test_writer())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .is_ok()
    }
}

/// Segment prefixes for log lines.
pub mod prefix {
    /// Database operations prefix
    pub const DB: &str = "⊔";
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_refused() {
        init_for_tests();
        assert!(!init("info"));
        init_for_tests();
    }
}
