use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wiretap_core::{Error, Result, WIRETAP_LOG_VAR};

pub use tracing::{debug, error, info, trace, warn, Level};

const DEFAULT_DIRECTIVES: &str = "info";

/// Install a compact stderr subscriber for the host process
///
/// Directives come from `WIRETAP_LOG`, then `RUST_LOG`, then default to
/// `info`. Fails if the host already installed a global subscriber.
pub fn init() -> Result<()> {
    init_with(&filter_directives())
}

/// Install the subscriber with explicit filter directives
pub fn init_with(directives: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directives)
        .map_err(|e| Error::configuration(format!("invalid log filter '{directives}': {e}")))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::configuration(format!("failed to install log subscriber: {e}")))
}

/// Filter directives resolved from the environment
pub fn filter_directives() -> String {
    [WIRETAP_LOG_VAR, EnvFilter::DEFAULT_ENV]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}

fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}
