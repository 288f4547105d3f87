//! The `flowstash ingest` command: run one batch from the command line.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use flowstash_core::{Config, FlowStash, IngestOptions, OutputFormat as CoreOutputFormat, ReportWriter};

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// One JSON document for the whole batch
    Json,
    /// One JSON object per item (newline-delimited)
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Arguments for the `ingest` command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Image URLs to ingest
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// JPEG quality (1-100)
    #[arg(short, long)]
    pub quality: Option<i64>,

    /// Maximum output width in pixels (1-4000)
    #[arg(long)]
    pub max_width: Option<i64>,

    /// Maximum output height in pixels (1-4000)
    #[arg(long)]
    pub max_height: Option<i64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the ingest command.
pub async fn execute(args: IngestArgs, config: Config) -> anyhow::Result<()> {
    let stash = FlowStash::new(config)?;
    let Some(orchestrator) = stash.orchestrator() else {
        anyhow::bail!(
            "No object store configured. Set NEXT_PUBLIC_SUPABASE_URL and \
             NEXT_PUBLIC_SUPABASE_KEY, or use storage.backend = \"memory\"."
        );
    };

    let options = IngestOptions::clamped(
        &stash.default_options(),
        args.quality,
        args.max_width,
        args.max_height,
    );

    let result = orchestrator
        .run_batch(&args.urls, &options)
        .await
        .map_err(|rejection| anyhow::anyhow!("Batch rejected: {rejection}"))?;

    let written = match args.output {
        Some(ref path) => {
            let file = File::create(path)?;
            let mut writer = ReportWriter::new(BufWriter::new(file), args.format.into(), true);
            let written = writer.write_batch(&result)?;
            tracing::info!("Output written to {:?}", path);
            written
        }
        None => {
            let stdout = std::io::stdout().lock();
            ReportWriter::new(stdout, args.format.into(), true).write_batch(&result)?
        }
    };
    tracing::debug!("Wrote {written} JSON value(s)");

    if result.failed > 0 {
        tracing::warn!("{} of {} images failed", result.failed, result.total);
    }
    Ok(())
}
