/// Native-messaging host for the StackSync sidebar.
/// The browser launches this binary and talks length-prefixed JSON over stdio;
/// diagnostics go to stderr.
use std::sync::Arc;

use anyhow::Context;
use stacksync_lib::host;
use stacksync_lib::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let state = AppState::load()
        .map_err(anyhow::Error::msg)
        .context("stacksync-host: failed to initialize")?;
    tracing::info!("stacksync-host v{} started", env!("CARGO_PKG_VERSION"));

    host::serve(Arc::new(state), tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("stacksync-host: connection failed")?;

    tracing::info!("stacksync-host: browser closed the connection");
    Ok(())
}
