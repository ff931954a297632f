//! Normalized OCR result types.
//!
//! Field names on the wire follow the persisted JSON artifact:
//! `file`, `full_text`, `boxes`, `total_lines`, `total_pages`.

use serde::{Deserialize, Serialize};

/// A corner point `[x, y]` in image pixel coordinates.
pub type Point = [f64; 2];

/// Four corner points in the oracle's winding order.
pub type Quad = [Point; 4];

/// One retained OCR detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLine {
    pub text: String,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    #[serde(rename = "bbox")]
    pub quadrilateral: Quad,
    /// 1-based page, only set for multi-page documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Aggregate result for one processed image or document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(rename = "file")]
    pub source_name: String,
    pub full_text: String,
    #[serde(rename = "boxes")]
    pub lines: Vec<DetectedLine>,
    #[serde(rename = "total_lines")]
    pub line_count: usize,
    #[serde(rename = "total_pages", default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

impl ExtractionResult {
    /// Result for a single image: texts are space-joined in detection order.
    pub fn from_lines(source_name: impl Into<String>, lines: Vec<DetectedLine>) -> Self {
        let full_text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            source_name: source_name.into(),
            full_text,
            line_count: lines.len(),
            lines,
            page_count: None,
        }
    }

    /// Empty result for a single image.
    #[cfg(test)]
    pub fn empty(source_name: impl Into<String>) -> Self {
        Self::from_lines(source_name, Vec::new())
    }
}

/// Accumulates per-page results into one document-level [`ExtractionResult`].
#[derive(Debug)]
pub struct DocumentBuilder {
    source_name: String,
    lines: Vec<DetectedLine>,
    blocks: Vec<String>,
    pages: usize,
}

impl DocumentBuilder {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            lines: Vec::new(),
            blocks: Vec::new(),
            pages: 0,
        }
    }

    /// Append page `page` (1-based). Lines are re-tagged with the page number.
    pub fn push_page(&mut self, page: u32, result: ExtractionResult) {
        self.pages += 1;

        if !result.full_text.is_empty() {
            self.blocks.push(format!("[Page {}] {}", page, result.full_text));
        }

        self.lines.extend(result.lines.into_iter().map(|mut line| {
            line.page = Some(page);
            line
        }));
    }

    /// Count a page that produced nothing (e.g. its extraction failed).
    pub fn skip_page(&mut self) {
        self.pages += 1;
    }

    pub fn finish(self) -> ExtractionResult {
        ExtractionResult {
            source_name: self.source_name,
            full_text: self.blocks.join("\n\n"),
            line_count: self.lines.len(),
            lines: self.lines,
            page_count: Some(self.pages),
        }
    }
}
