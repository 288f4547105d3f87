//! The `flowstash serve` command.

use std::sync::Arc;

use clap::Args;
use flowstash_core::{Config, FlowStash};

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.bind)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Execute the serve command.
pub async fn execute(args: ServeArgs, config: Config) -> anyhow::Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let stash = Arc::new(FlowStash::new(config)?);

    if stash.orchestrator().is_none() {
        tracing::warn!("Ingestion endpoint will answer with a configuration error");
    }
    if stash.config().sync.secret.is_none() {
        tracing::warn!("SYNC_SECRET not set; every sync request will be rejected");
    }

    crate::server::serve(stash, &bind).await
}
