//! Logging setup
//!
//! Everything in the workspace logs through `tracing`. Binaries and
//! integration tests call [`init_tracing`] once at startup; the filter comes
//! from `RUST_LOG` when set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is absent.
pub const DEFAULT_LOG_FILTER: &str = "info,timeflow_core=debug,timeflow_infra=debug";

/// Install the global fmt subscriber.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the existing one stays in place.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
