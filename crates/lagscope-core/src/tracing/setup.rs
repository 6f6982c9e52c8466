//! Tracing initialization and configuration.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the lagscope tracing/logging system.
///
/// Reads the `LAGSCOPE_LOG` environment variable for per-subsystem log
/// levels, e.g. `LAGSCOPE_LOG=lagscope_analysis=debug,lagscope_core=warn`.
///
/// Falls back to `lagscope=info` if `LAGSCOPE_LOG` is not set or is
/// invalid.
///
/// This function is idempotent; calling it multiple times is safe.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("LAGSCOPE_LOG")
            .unwrap_or_else(|_| EnvFilter::new("lagscope=info"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .init();
    });
}
