//! Persisted result files in the output directory.
//!
//! Every processed input produces `ocr_{stem}.json`, `ocr_{stem}.md` and
//! `ocr_{stem}.txt`; overlays are written as `boxes_{stem}.png`.

use crate::formatter::{to_markdown, to_plain_text};
use crate::schema::ExtractionResult;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names (relative to the output directory) of one result's artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactFiles {
    pub json: String,
    pub markdown: String,
    pub text: String,
}

/// Output file listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct ResultFile {
    pub name: String,
    pub size: u64,
    pub modified: String,
}

/// Input filename without directory and extension.
pub fn stem(input_name: &str) -> String {
    Path::new(input_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

pub fn overlay_name(input_name: &str) -> String {
    format!("boxes_{}.png", stem(input_name))
}

/// Write the JSON, Markdown and plain-text artifacts for `result`.
pub fn write_artifacts(out_dir: &Path, input_name: &str, result: &ExtractionResult) -> Result<ArtifactFiles> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output dir {:?}", out_dir))?;

    let base = format!("ocr_{}", stem(input_name));
    let files = ArtifactFiles {
        json: format!("{}.json", base),
        markdown: format!("{}.md", base),
        text: format!("{}.txt", base),
    };

    let json = serde_json::to_string_pretty(result)?;
    write(out_dir.join(&files.json), json)?;
    write(out_dir.join(&files.markdown), to_markdown(result))?;
    write(out_dir.join(&files.text), to_plain_text(result))?;

    debug!("Wrote artifacts for {} to {:?}", input_name, out_dir);
    Ok(files)
}

fn write(path: PathBuf, contents: String) -> Result<()> {
    std::fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))
}

/// Read a JSON artifact back.
#[cfg(test)]
pub fn read_result(path: &Path) -> Result<ExtractionResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read result: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse result: {:?}", path))
}

/// Files in the output directory, newest first.
pub fn list_results(out_dir: &Path) -> Result<Vec<ResultFile>> {
    if !out_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<(DateTime<Utc>, ResultFile)> = Vec::new();

    for entry in std::fs::read_dir(out_dir)? {
        let entry = entry?;
        let meta = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let modified: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
        entries.push((
            modified,
            ResultFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                modified: modified.to_rfc3339(),
            },
        ));
    }

    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    Ok(entries.into_iter().map(|(_, f)| f).collect())
}

/// Content type served for an artifact, by extension.
pub fn content_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => "application/json",
        "md" => "text/markdown; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
