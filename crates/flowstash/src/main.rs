//! flowstash CLI - image URL ingestion with content-addressed dedup.
//!
//! flowstash fetches images from allow-listed hosts, recompresses them to
//! JPEG, and stores each one once per content key. It can run as an HTTP
//! service or as one-shot commands.
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP endpoints
//! flowstash serve --bind 0.0.0.0:3000
//!
//! # Ingest URLs from the command line
//! flowstash ingest https://storage.googleapis.com/bucket/a.png --format jsonl
//!
//! # Backfill catalog rows for stored images
//! flowstash sync --dry-run
//!
//! # View configuration
//! flowstash config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;
mod server;

/// flowstash - image URL ingestion with content-addressed dedup.
#[derive(Parser, Debug)]
#[command(name = "flowstash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "FLOWSTASH_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the ingestion and sync HTTP endpoints
    Serve(cli::serve::ServeArgs),

    /// Fetch, compress, and store images from URLs
    Ingest(cli::ingest::IngestArgs),

    /// Insert catalog rows for stored images that lack one
    Sync(cli::sync::SyncArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config_path = cli::config_path(cli.config.as_deref());
    let config = match cli::load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `flowstash config path`."
            );
            let mut config = flowstash_core::Config::default();
            config.apply_env();
            config
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("flowstash v{}", flowstash_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args, config).await,
        Commands::Ingest(args) => cli::ingest::execute(args, config).await,
        Commands::Sync(args) => cli::sync::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config, config_path).await,
    }
}
