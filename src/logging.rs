use anyhow::Context as _;

const DEFAULT_FILTER: &str = "info,reqwest=warn";

/// Installs the global subscriber. Logs go to stderr; stdout carries only
/// the run summary and `book-url` output.
///
/// Without `RUST_LOG`, per-request chatter from the HTTP stack is held at
/// warn so the per-book progress lines stay readable.
pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
