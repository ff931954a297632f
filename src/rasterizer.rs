//! Document → page images.
//!
//! Pages are counted with lopdf and rendered one at a time by `pdftoppm`
//! (poppler-utils) into uniquely named PNGs in the work directory. Every page
//! is handed out as a [`ScratchFile`], so dropping it deletes the image.

use crate::error::OcrError;
use crate::scratch::ScratchFile;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// PDF user-space resolution; rendering at `72 * scale` dpi upscales linearly by `scale`.
const BASE_DPI: u32 = 72;

/// Turns a multi-page document into ordered page images.
#[async_trait::async_trait]
pub trait Rasterizer: Send + Sync {
    /// Page images in page order. On error, already rendered pages are removed.
    async fn rasterize(&self, document: &Path) -> Result<Vec<ScratchFile>, OcrError>;
}

#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    pdftoppm_bin: String,
    scale: u32,
    work_dir: PathBuf,
}

impl PdfRasterizer {
    pub fn new(pdftoppm_bin: impl Into<String>, scale: u32, work_dir: PathBuf) -> Self {
        Self {
            pdftoppm_bin: pdftoppm_bin.into(),
            scale,
            work_dir,
        }
    }

    fn dpi(&self) -> u32 {
        BASE_DPI * self.scale
    }

    async fn render_page(&self, document: &Path, page_number: usize) -> Result<ScratchFile, OcrError> {
        let prefix = self
            .work_dir
            .join(format!("page_{}_{:03}", Uuid::new_v4().simple(), page_number));
        // Adopt first so a partially written file is still cleaned up.
        let image = ScratchFile::adopt(prefix.with_extension("png"));

        let output = Command::new(&self.pdftoppm_bin)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi().to_string())
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-singlefile")
            .arg(document)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                OcrError::rasterize(
                    document,
                    format!("failed to invoke {}; is poppler-utils installed? {}", self.pdftoppm_bin, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::rasterize(
                document,
                format!("pdftoppm failed on page {}: {}", page_number, stderr.trim()),
            ));
        }

        if !image.path().exists() {
            return Err(OcrError::rasterize(
                document,
                format!("expected rendered image not found: {}", image.path().display()),
            ));
        }

        Ok(image)
    }
}

#[async_trait::async_trait]
impl Rasterizer for PdfRasterizer {
    async fn rasterize(&self, document: &Path) -> Result<Vec<ScratchFile>, OcrError> {
        let page_count = count_pages(document)?;
        info!(
            "Rasterizing {} ({} pages at {} dpi)",
            document.display(),
            page_count,
            self.dpi()
        );

        tokio::fs::create_dir_all(&self.work_dir).await?;

        let mut pages = Vec::with_capacity(page_count);
        for page_number in 1..=page_count {
            pages.push(self.render_page(document, page_number).await?);
            debug!("Rendered page {}/{}", page_number, page_count);
        }
        Ok(pages)
    }
}

/// Number of pages in a PDF.
pub fn count_pages(document: &Path) -> Result<usize, OcrError> {
    let doc = lopdf::Document::load(document)
        .map_err(|e| OcrError::rasterize(document, format!("failed to load PDF: {}", e)))?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpi_follows_scale() {
        let rasterizer = PdfRasterizer::new("pdftoppm", 2, PathBuf::from("/tmp"));
        assert_eq!(rasterizer.dpi(), 144);
    }

    #[test]
    fn test_count_pages_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        let err = count_pages(&path).unwrap_err();
        assert!(matches!(err, OcrError::Rasterize { .. }));
    }

    #[test]
    fn test_count_pages_missing_file() {
        assert!(count_pages(Path::new("/nonexistent/doc.pdf")).is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_rasterize_error() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = PdfRasterizer::new("pdftoppm-does-not-exist", 2, dir.path().to_path_buf());
        let err = rasterizer
            .render_page(Path::new("/nonexistent/doc.pdf"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Rasterize { .. }));
    }
}
