//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use nvcf_preflight::{CheckReport, InferenceReport};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

impl TableDisplay for CheckReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer)?;
        writeln!(writer, "Pre-flight Check: {}", self.image)?;
        writeln!(writer, "══════════════════════════════════════════════════")?;
        writeln!(writer, "  Protocol:       {}", self.protocol)?;
        writeln!(writer, "  Container:      {}", self.container_id)?;
        writeln!(writer, "  Host Port:      {}", self.host_port)?;
        if let Some(sweep) = &self.sweep {
            writeln!(
                writer,
                "  Swept:          {} of {} container(s)",
                sweep.removed.len(),
                sweep.matched
            )?;
        }
        writeln!(writer)?;

        writeln!(writer, "Health")?;
        writeln!(writer, "  Target:         {}", self.health.target)?;
        writeln!(
            writer,
            "  Healthy After:  {} attempt(s), {} ms",
            self.health.attempts, self.health.elapsed_ms
        )?;
        writeln!(writer)?;

        match &self.inference {
            None => writeln!(writer, "Inference: skipped")?,
            Some(InferenceReport::Http(reply)) => {
                writeln!(writer, "Inference (HTTP)")?;
                writeln!(writer, "  URL:            {}", reply.url)?;
                writeln!(writer, "  Status:         {}", reply.status)?;
                if let Some(content_type) = &reply.content_type {
                    writeln!(writer, "  Content-Type:   {content_type}")?;
                }
            }
            Some(InferenceReport::Grpc(invocation)) => {
                writeln!(writer, "Inference (gRPC)")?;
                writeln!(writer, "  Method:         {}", invocation.method)?;
                writeln!(writer, "  Response:       {} field(s)", invocation.response.len())?;
                if !invocation.skipped.is_empty() {
                    writeln!(writer, "  Skipped:        {}", invocation.skipped.join(", "))?;
                }
            }
        }
        Ok(())
    }
}
