//! Tesseract OCR provider (runs the `tesseract` binary, parses its TSV output).

use super::{ConfidenceScale, OcrProvider, RawDetection, RawGeometry};
use crate::error::OcrError;
use csv::StringRecord;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// TSV `level` value of word rows. Lower levels are page/block/paragraph/line.
const WORD_LEVEL: u32 = 5;

pub struct TesseractProvider {
    bin: String,
    language: String,
}

impl TesseractProvider {
    /// Verify the binary runs and every requested language (`spa+eng`) is installed.
    pub async fn init(bin: &str, language: &str) -> Result<Self, OcrError> {
        let output = Command::new(bin)
            .arg("--list-langs")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OcrError::unavailable("tesseract", format!("failed to run {}: {}", bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::unavailable("tesseract", format!("--list-langs failed: {}", stderr.trim())));
        }

        // Older versions print the list on stderr.
        let listing = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let installed = parse_language_list(&listing);
        let missing: Vec<&str> = language
            .split('+')
            .filter(|l| !installed.iter().any(|i| i == l))
            .collect();
        if !missing.is_empty() {
            return Err(OcrError::unavailable(
                "tesseract",
                format!("language data not installed: {}", missing.join(", ")),
            ));
        }

        info!("TesseractProvider: {} ready with languages {:?}", bin, installed);
        Ok(Self {
            bin: bin.to_string(),
            language: language.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl OcrProvider for TesseractProvider {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn confidence_scale(&self) -> ConfidenceScale {
        ConfidenceScale::Percent
    }

    async fn detect(&self, image_path: &Path) -> Result<Vec<RawDetection>, OcrError> {
        debug!("TesseractProvider: running on {}", image_path.display());

        let output = Command::new(&self.bin)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OcrError::engine("tesseract", format!("failed to run {}: {}", self.bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::engine("tesseract", stderr.trim()));
        }

        let detections = parse_tsv(&output.stdout)?;
        debug!(
            "TesseractProvider: {} word detections in {}",
            detections.len(),
            image_path.display()
        );
        Ok(detections)
    }
}

/// Parse `tesseract --list-langs` output, skipping the header line.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

/// Parse tesseract TSV output into word-level detections, in output order.
///
/// Confidence is left on tesseract's percent scale; `-1` and empty words are
/// kept so callers decide what to discard.
pub fn parse_tsv(data: &[u8]) -> Result<Vec<RawDetection>, OcrError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| OcrError::engine("tesseract", format!("unreadable TSV header: {}", e)))?
        .clone();
    let columns = TsvColumns::locate(&headers)?;

    let mut detections = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| OcrError::engine("tesseract", format!("bad TSV row: {}", e)))?;
        if columns.number::<u32>(&record, columns.level)? != WORD_LEVEL {
            continue;
        }

        detections.push(RawDetection {
            text: record.get(columns.text).unwrap_or("").to_string(),
            confidence: columns.number(&record, columns.conf)?,
            geometry: RawGeometry::Box {
                left: columns.number(&record, columns.left)?,
                top: columns.number(&record, columns.top)?,
                width: columns.number(&record, columns.width)?,
                height: columns.number(&record, columns.height)?,
            },
        });
    }

    Ok(detections)
}

struct TsvColumns {
    level: usize,
    left: usize,
    top: usize,
    width: usize,
    height: usize,
    conf: usize,
    text: usize,
}

impl TsvColumns {
    fn locate(headers: &StringRecord) -> Result<Self, OcrError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| OcrError::engine("tesseract", format!("TSV output has no '{}' column", name)))
        };

        Ok(Self {
            level: find("level")?,
            left: find("left")?,
            top: find("top")?,
            width: find("width")?,
            height: find("height")?,
            conf: find("conf")?,
            text: find("text")?,
        })
    }

    fn number<T: std::str::FromStr>(&self, record: &StringRecord, idx: usize) -> Result<T, OcrError> {
        let raw = record.get(idx).unwrap_or("").trim();
        raw.parse()
            .map_err(|_| OcrError::engine("tesseract", format!("non-numeric TSV field '{}'", raw)))
    }
}
