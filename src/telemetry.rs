//! Logging setup for binaries and tests.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a global fmt subscriber. DEBUG when `debug` is set, INFO otherwise.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(debug: bool) -> bool {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
