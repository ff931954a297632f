//! Sequential multi-input processing with a tabular summary.

use crate::artifacts::write_artifacts;
use crate::extractor::Extractor;
use crate::schema::ExtractionResult;
use crate::scratch::ScratchDir;
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Characters of extracted text kept in a summary row.
const PREVIEW_CHARS: usize = 100;

pub const SUMMARY_FILE: &str = "ocr_results.csv";

/// One input handed to [`process_batch`].
#[derive(Debug)]
pub struct BatchInput {
    /// Name reported in the summary (the client's filename).
    pub filename: String,
    pub path: PathBuf,
    /// Drop guard for the upload directory holding `path`. Never read; the
    /// directory is removed when the input is consumed by [`process_batch`].
    pub _scratch: Option<ScratchDir>,
}

/// One summary row. Failed inputs have zero counts and the error in `text`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Lines")]
    pub lines: usize,
    #[serde(rename = "Pages")]
    pub pages: usize,
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(skip)]
    pub failed: bool,
}

impl BatchRow {
    fn success(filename: &str, result: &ExtractionResult) -> Self {
        Self {
            filename: filename.to_string(),
            lines: result.line_count,
            pages: result.page_count.unwrap_or(1),
            text: preview(&result.full_text),
            failed: false,
        }
    }

    fn failure(filename: &str, message: String) -> Self {
        Self {
            filename: filename.to_string(),
            lines: 0,
            pages: 0,
            text: format!("Error: {}", message),
            failed: true,
        }
    }
}

/// First 100 characters, with `...` appended when truncated.
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Extract each input in order and persist its artifacts into `out_dir`.
///
/// A failing input becomes a failure row; the remaining inputs still run.
/// Each input's scratch directory is dropped before the next input starts.
pub async fn process_batch(extractor: &Extractor, out_dir: &Path, inputs: Vec<BatchInput>) -> Vec<BatchRow> {
    let total = inputs.len();
    let mut rows = Vec::with_capacity(total);

    for (idx, input) in inputs.into_iter().enumerate() {
        info!("Processing {}/{}: {}", idx + 1, total, input.filename);

        let outcome = match extractor.extract_path(&input.path).await {
            Ok(result) => write_artifacts(out_dir, &input.filename, &result).map(|_| result),
            Err(e) => Err(e.into()),
        };

        let row = match outcome {
            Ok(result) => BatchRow::success(&input.filename, &result),
            Err(e) => {
                warn!("Error processing {}: {:#}", input.filename, e);
                BatchRow::failure(&input.filename, format!("{:#}", e))
            }
        };
        rows.push(row);
    }

    rows
}

/// Summary rows as CSV with a `Filename,Lines,Pages,Text` header.
pub fn to_csv(rows: &[BatchRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(["Filename", "Lines", "Pages", "Text"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    let data = writer.into_inner().map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e))?;
    Ok(String::from_utf8(data)?)
}
