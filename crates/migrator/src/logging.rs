//! Structured logging setup. One span per run id, one per operation, one
//! per test case, so a production deployment gets filterable logs instead
//! of only the CLI's human-readable progress callbacks.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading `RUST_LOG` (falling
/// back to `info`). Safe to call more than once — a failed
/// `set_global_default` (subscriber already installed) is ignored rather
/// than panicking, since tests in this workspace each call `init()`
/// independently.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
