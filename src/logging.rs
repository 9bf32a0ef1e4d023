//! Structured logging setup (§10.1). Every stage logs through `tracing`,
//! tagged with its own name (`blocks`, `metadata`, `source`) and the chain
//! under consideration; this module only wires up where those events go.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Installs the global `tracing` subscriber. `level` seeds the default
/// filter directive; `RUST_LOG`, if set, still takes precedence per
/// `EnvFilter`'s own rules.
pub fn init(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
