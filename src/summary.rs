use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDateTime;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::DashError;

/// Text shown in place of a summary the server did not provide.
pub const SUMMARY_PLACEHOLDER: &str = "Summary not available";

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryExport {
    pub filename: String,
    pub contents: String,
}

fn sanitize_order(model_order: &str) -> String {
    model_order
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '(' || c == ')' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Frame a model summary for download.
///
/// `model_order` and `file_name` fall back to `N/A` and `model` when blank.
pub fn export_summary(
    text: &str,
    model_order: &str,
    file_name: &str,
    exported_at: NaiveDateTime,
) -> Result<SummaryExport, DashError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == SUMMARY_PLACEHOLDER {
        return Err(DashError::validation("no summary available to export"));
    }

    let order = if model_order.trim().is_empty() { "N/A" } else { model_order };
    let file = if file_name.trim().is_empty() { "model" } else { file_name };
    let filename = format!(
        "summary_{}_{}_{}.txt",
        sanitize_order(order),
        file,
        exported_at.format("%Y-%m-%d")
    );

    let rule = "=".repeat(RULE_WIDTH);
    let mut contents = String::new();
    contents.push_str(&rule);
    contents.push('\n');
    contents.push_str("SUMMARY ARIMA/SARIMA MODEL\n");
    contents.push_str("SYRIAS DASH - Export Summary\n");
    contents.push_str(&format!("Export date: {}\n", exported_at.format("%d/%m/%Y %H:%M:%S")));
    contents.push_str(&rule);
    contents.push_str("\n\n");
    contents.push_str(text);
    contents.push_str("\n\n");
    contents.push_str(&rule);
    contents.push('\n');
    contents.push_str("End of summary\n");
    contents.push_str(&rule);
    contents.push('\n');

    Ok(SummaryExport { filename, contents })
}

impl SummaryExport {
    /// Write the export into `dir` atomically and return the final path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let target = dir.join(&self.filename);

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(self.contents.as_bytes())?;
        temp.flush()?;
        temp.persist(&target)?;

        info!("Exported model summary to {:?}", target);
        Ok(target)
    }
}
