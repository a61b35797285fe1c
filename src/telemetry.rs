//! Structured logging setup
//!
//! Every component logs through `tracing`; binaries and demos call
//! [`init`] once to install a formatted subscriber.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `true` if this call installed the subscriber, `false` if a
/// global subscriber was already set. Safe to call repeatedly.
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _first = init();
        assert!(!init(), "second init must not replace the subscriber");
    }
}
