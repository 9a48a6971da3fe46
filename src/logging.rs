//! Tracing subscriber setup.

use std::sync::Once;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "STAGE_PROXY_LOG";

/// Install a `fmt` subscriber filtered by `STAGE_PROXY_LOG`, then
/// `RUST_LOG`, then `info`. Later calls do nothing, as do calls made after
/// another global subscriber was installed.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));
        install(filter);
    });
}

/// Same as [`init_tracing`] with an explicit filter (CLI verbosity flags).
pub fn init_tracing_with(directives: &str) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_new(directives).unwrap_or_else(|err| {
            eprintln!("invalid log filter '{directives}': {err}");
            EnvFilter::new("info")
        });
        install(filter);
    });
}

fn install(filter: EnvFilter) {
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already set");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        // A second installer finds the subscriber already set and keeps it.
        init_tracing_with("debug");
        tracing::info!("still alive");
    }
}
