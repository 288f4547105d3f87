//! Report output for command-line ingestion runs.
//!
//! `json` writes the whole [`BatchResult`] as one document, the same shape the
//! HTTP endpoint returns. `jsonl` writes one item outcome per line, suited to
//! piping into other tools.

use std::io::{self, Write};

use serde::Serialize;

use crate::types::BatchResult;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON document for the whole batch
    Json,
    /// One JSON object per item (newline-delimited JSON)
    JsonLines,
}

/// Success body of the ingestion endpoint: `{"success": true, ...result}`.
#[derive(Debug, Serialize)]
pub struct BatchEnvelope<'a> {
    pub success: bool,
    #[serde(flatten)]
    pub result: &'a BatchResult,
}

impl<'a> BatchEnvelope<'a> {
    pub fn new(result: &'a BatchResult) -> Self {
        Self {
            success: true,
            result,
        }
    }
}

/// Writes batch results in the chosen format.
pub struct ReportWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
}

impl<W: Write> ReportWriter<W> {
    /// `pretty` only affects the `json` format.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
        }
    }

    /// Write one batch result. Returns the number of JSON values written.
    pub fn write_batch(&mut self, result: &BatchResult) -> io::Result<usize> {
        let written = match self.format {
            OutputFormat::Json => {
                let envelope = BatchEnvelope::new(result);
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, &envelope)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, &envelope)
                        .map_err(io::Error::other)?;
                }
                writeln!(self.writer)?;
                1
            }
            OutputFormat::JsonLines => {
                for outcome in &result.results {
                    serde_json::to_writer(&mut self.writer, outcome).map_err(io::Error::other)?;
                    writeln!(self.writer)?;
                }
                result.results.len()
            }
        };
        self.writer.flush()?;
        Ok(written)
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
