//! `tracing` initialization for the CLI entrypoint: a console-only layer,
//! no file rotation — this binary is a thin, short-lived wrapper, so a
//! console layer is all it needs.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Initializes a console `tracing` subscriber. `filter_override` takes
/// precedence over `RUST_LOG`, which takes precedence over the conservative
/// default `info`.
pub fn init(filter_override: Option<&str>) -> Result<(), anyhow::Error> {
    let filter = build_filter(filter_override)?;

    use std::io::IsTerminal as _;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    tracing_subscriber::registry().with(filter).with(console_layer).init();
    Ok(())
}

fn build_filter(filter_override: Option<&str>) -> Result<tracing_subscriber::EnvFilter, anyhow::Error> {
    let filter_str = if let Some(filter) = filter_override {
        filter.to_string()
    } else if let Ok(filter) = std::env::var("RUST_LOG") {
        filter
    } else {
        "info".to_string()
    };
    Ok(tracing_subscriber::EnvFilter::try_new(filter_str)?)
}
