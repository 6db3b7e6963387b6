//! Process-wide tracing setup
//!
//! The library only emits `tracing` events. Binaries install a subscriber
//! once with [`init`]; later calls are no-ops, so demos and tests can call it
//! freely.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install the fmt subscriber, honouring `RUST_LOG`
///
/// Returns `true` if this call installed the subscriber and `false` if one
/// was already set.
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

/// Install the fmt subscriber with `default_filter` as fallback for `RUST_LOG`
pub fn init_with_filter(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
}
