//! The `flowstash sync` command: reconcile the catalog once.

use clap::Args;
use flowstash_core::{Config, FlowStash, SyncError};

/// Arguments for the `sync` command.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Report what would be inserted without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Override the catalog table
    #[arg(long)]
    pub table: Option<String>,

    /// Override the folder to scan
    #[arg(long)]
    pub folder: Option<String>,
}

/// Execute the sync command.
///
/// Runs locally with the operator's service credentials, so the shared sync
/// secret is not checked.
pub async fn execute(args: SyncArgs, config: Config) -> anyhow::Result<()> {
    let stash = FlowStash::new(config)?;
    let Some(reconciler) = stash.reconciler() else {
        anyhow::bail!(
            "No catalog configured. Set NEXT_PUBLIC_SUPABASE_URL and \
             SUPABASE_SERVICE_ROLE_KEY, or use storage.backend = \"memory\"."
        );
    };

    let mut params = stash.sync_params();
    if let Some(table) = args.table {
        params.table = table;
    }
    if let Some(folder) = args.folder {
        params.folder = folder.trim_matches('/').to_string();
    }

    match reconciler.reconcile(&params, args.dry_run).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.dry_run {
                tracing::info!("{} rows would be inserted", report.would_insert);
            }
            Ok(())
        }
        Err(SyncError::Insert {
            failed_chunk,
            committed_rows,
            chunks,
            source,
        }) => {
            for chunk in &chunks {
                tracing::info!("chunk {}: {} rows, {:?}", chunk.index, chunk.rows, chunk.status);
            }
            anyhow::bail!(
                "Sync stopped at chunk {failed_chunk} ({committed_rows} rows committed): {source}"
            )
        }
        Err(e) => Err(e.into()),
    }
}
