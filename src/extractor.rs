//! Extraction pipeline: single images and multi-page documents.

use crate::error::OcrError;
use crate::ocr::normalize::normalize_all;
use crate::ocr::OracleHandle;
use crate::rasterizer::Rasterizer;
use crate::schema::{DocumentBuilder, ExtractionResult};
use crate::scratch::ScratchFile;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extraction pipeline orchestrator.
#[derive(Clone)]
pub struct Extractor {
    oracle: OracleHandle,
    rasterizer: Arc<dyn Rasterizer>,
}

impl Extractor {
    pub fn new(oracle: OracleHandle, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { oracle, rasterizer }
    }

    /// Dispatch on the file extension: `.pdf` goes through the page aggregator.
    pub async fn extract_path(&self, path: &Path) -> Result<ExtractionResult, OcrError> {
        if is_document(path) {
            self.extract_document(path).await
        } else {
            self.extract(path).await
        }
    }

    /// Run the OCR engine once on an image and normalize its answer.
    ///
    /// Anything that does not decode as an image is an [`OcrError::ImageLoad`]
    /// and never reaches the engine.
    pub async fn extract(&self, image_path: &Path) -> Result<ExtractionResult, OcrError> {
        let (width, height) = image_dimensions(image_path)?;
        debug!("Image {} is {}x{}", image_path.display(), width, height);

        let provider = self.oracle.get().await?;
        let raw = provider.detect(image_path).await?;
        let lines = normalize_all(&raw, provider.confidence_scale());

        debug!(
            "Extracted {} of {} detections from {}",
            lines.len(),
            raw.len(),
            image_path.display()
        );

        Ok(ExtractionResult::from_lines(source_name(image_path), lines))
    }

    /// Rasterize a document and extract every page in order.
    ///
    /// A page that fails is logged and contributes nothing; an unavailable
    /// engine aborts the whole document. Each page image is deleted before the
    /// next page is processed.
    pub async fn extract_document(&self, document_path: &Path) -> Result<ExtractionResult, OcrError> {
        let pages = self.rasterizer.rasterize(document_path).await?;
        let total = pages.len();
        info!("Extracting {} ({} pages)", document_path.display(), total);

        let mut builder = DocumentBuilder::new(source_name(document_path));
        for (idx, page) in pages.into_iter().enumerate() {
            let page_number = (idx + 1) as u32;
            match self.extract_page(page).await {
                Ok(result) => {
                    debug!("Page {}/{}: {} lines", page_number, total, result.line_count);
                    builder.push_page(page_number, result);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        "Page {}/{} of {} failed: {}",
                        page_number,
                        total,
                        document_path.display(),
                        e
                    );
                    builder.skip_page();
                }
            }
        }

        let result = builder.finish();
        info!(
            "Extracted {} lines from {} pages of {}",
            result.line_count,
            total,
            result.source_name
        );
        Ok(result)
    }

    /// Consumes the page so its image is released as soon as extraction returns.
    async fn extract_page(&self, page: ScratchFile) -> Result<ExtractionResult, OcrError> {
        self.extract(page.path()).await
    }
}

/// Decode just enough of the file to learn its dimensions.
fn image_dimensions(path: &Path) -> Result<(u32, u32), OcrError> {
    if !path.is_file() {
        return Err(OcrError::image_load(path, "not a readable file"));
    }
    image::ImageReader::open(path)
        .map_err(|e| OcrError::image_load(path, e))?
        .with_guessed_format()
        .map_err(|e| OcrError::image_load(path, e))?
        .into_dimensions()
        .map_err(|e| OcrError::image_load(path, e))
}

pub fn is_document(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Base filename without directory components.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::formatter::to_plain_text;
    use crate::ocr::testing::{word, write_png, ScriptedProvider};
    use crate::ocr::{ConfidenceScale, OcrProvider, RawDetection};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Writes one scratch PNG per requested page name.
    pub(crate) struct ScratchRasterizer {
        pub dir: PathBuf,
        pub pages: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl Rasterizer for ScratchRasterizer {
        async fn rasterize(&self, document: &Path) -> Result<Vec<ScratchFile>, OcrError> {
            if !document.exists() {
                return Err(OcrError::rasterize(document, "missing"));
            }
            let mut pages = Vec::new();
            for name in &self.pages {
                let path = self.dir.join(name);
                write_png(&path);
                pages.push(ScratchFile::adopt(path));
            }
            Ok(pages)
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        path
    }

    fn png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        write_png(&path);
        path
    }

    fn extractor(provider: impl OcrProvider + 'static, rasterizer: ScratchRasterizer) -> Extractor {
        Extractor::new(
            OracleHandle::from_provider(Arc::new(provider)),
            Arc::new(rasterizer),
        )
    }

    #[tokio::test]
    async fn test_extract_normalizes_and_joins() {
        let dir = tempfile::tempdir().unwrap();
        let image = png(dir.path(), "recibo.png");
        let provider = ScriptedProvider::new(ConfidenceScale::Percent).answer(
            "recibo.png",
            vec![
                word("Total", 95.0, 10.0, 10.0),
                word("  ", 80.0, 60.0, 10.0),
                word("42,00", -1.0, 90.0, 10.0),
                word("EUR", 50.0, 120.0, 10.0),
            ],
        );
        let ex = extractor(provider, ScratchRasterizer { dir: dir.path().into(), pages: vec![] });

        let result = ex.extract(&image).await.unwrap();
        assert_eq!(result.source_name, "recibo.png");
        assert_eq!(result.full_text, "Total EUR");
        assert_eq!(result.line_count, 2);
        assert_eq!(result.line_count, result.lines.len());
        assert_eq!(result.page_count, None);
        for line in &result.lines {
            assert!((0.0..=1.0).contains(&line.confidence));
            assert_eq!(line.quadrilateral.len(), 4);
        }
        assert_eq!(to_plain_text(&result), result.full_text);
    }

    #[tokio::test]
    async fn test_extract_no_detections_is_empty_success() {
        let dir = tempfile::tempdir().unwrap();
        let image = png(dir.path(), "blank.png");
        let ex = extractor(
            ScriptedProvider::new(ConfidenceScale::Percent),
            ScratchRasterizer { dir: dir.path().into(), pages: vec![] },
        );

        let result = ex.extract(&image).await.unwrap();
        assert_eq!(result.full_text, "");
        assert!(result.lines.is_empty());
        assert_eq!(result.line_count, 0);
    }

    #[tokio::test]
    async fn test_extract_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(
            ScriptedProvider::new(ConfidenceScale::Percent),
            ScratchRasterizer { dir: dir.path().into(), pages: vec![] },
        );

        let err = ex.extract(Path::new("/nonexistent/path/image.png")).await.unwrap_err();
        assert!(matches!(err, OcrError::ImageLoad { .. }));
    }

    #[tokio::test]
    async fn test_extract_non_image_is_load_error_before_engine() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notas.png");
        std::fs::write(&notes, "esto es texto, no una imagen").unwrap();
        let provider = Arc::new(ScriptedProvider::new(ConfidenceScale::Percent));
        let ex = Extractor::new(
            OracleHandle::from_provider(provider.clone()),
            Arc::new(ScratchRasterizer { dir: dir.path().into(), pages: vec![] }),
        );

        let err = ex.extract(&notes).await.unwrap_err();
        assert!(matches!(err, OcrError::ImageLoad { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(provider.calls.lock().unwrap().is_empty());

        let err = ex.extract(dir.path()).await.unwrap_err();
        assert!(matches!(err, OcrError::ImageLoad { .. }));
    }

    #[tokio::test]
    async fn test_document_with_blank_middle_page() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = touch(dir.path(), "contrato.pdf");
        let provider = ScriptedProvider::new(ConfidenceScale::Percent)
            .answer("p1.png", vec![word("Primera", 90.0, 0.0, 0.0), word("hoja", 80.0, 50.0, 0.0)])
            .answer("p3.png", vec![word("Firma", 70.0, 0.0, 0.0)]);
        let ex = extractor(
            provider,
            ScratchRasterizer { dir: dir.path().into(), pages: vec!["p1.png", "p2.png", "p3.png"] },
        );

        let result = ex.extract_path(&pdf).await.unwrap();
        assert_eq!(result.source_name, "contrato.pdf");
        assert_eq!(result.page_count, Some(3));
        assert_eq!(result.full_text, "[Page 1] Primera hoja\n\n[Page 3] Firma");
        let pages: Vec<_> = result.lines.iter().map(|l| l.page.unwrap()).collect();
        assert_eq!(pages, vec![1, 1, 3]);
        assert_eq!(result.line_count, 3);

        for name in ["p1.png", "p2.png", "p3.png"] {
            assert!(!dir.path().join(name).exists());
        }
    }

    #[tokio::test]
    async fn test_failed_page_does_not_stop_document() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = touch(dir.path(), "scan.pdf");
        let provider = ScriptedProvider::new(ConfidenceScale::Percent)
            .fail("p1.png", "segfault")
            .answer("p2.png", vec![word("ok", 90.0, 0.0, 0.0)]);
        let ex = extractor(
            provider,
            ScratchRasterizer { dir: dir.path().into(), pages: vec!["p1.png", "p2.png"] },
        );

        let result = ex.extract_document(&pdf).await.unwrap();
        assert_eq!(result.page_count, Some(2));
        assert_eq!(result.full_text, "[Page 2] ok");
        assert!(!dir.path().join("p1.png").exists());
        assert!(!dir.path().join("p2.png").exists());
    }

    /// Engine that is down for every call.
    struct DownProvider {
        calls: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl OcrProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        fn confidence_scale(&self) -> ConfidenceScale {
            ConfidenceScale::Percent
        }

        async fn detect(&self, _image_path: &Path) -> Result<Vec<RawDetection>, OcrError> {
            *self.calls.lock().unwrap() += 1;
            Err(OcrError::unavailable("down", "engine crashed"))
        }
    }

    #[tokio::test]
    async fn test_fatal_error_releases_remaining_pages() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = touch(dir.path(), "largo.pdf");
        let provider = Arc::new(DownProvider { calls: Mutex::new(0) });
        let pages = vec!["f1.png", "f2.png", "f3.png"];
        let ex = Extractor::new(
            OracleHandle::from_provider(provider.clone()),
            Arc::new(ScratchRasterizer { dir: dir.path().into(), pages: pages.clone() }),
        );

        let err = ex.extract_document(&pdf).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(*provider.calls.lock().unwrap(), 1);
        for name in pages {
            assert!(!dir.path().join(name).exists());
        }
    }

    #[tokio::test]
    async fn test_zero_page_document() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = touch(dir.path(), "vacio.pdf");
        let ex = extractor(
            ScriptedProvider::new(ConfidenceScale::Percent),
            ScratchRasterizer { dir: dir.path().into(), pages: vec![] },
        );

        let result = ex.extract_document(&pdf).await.unwrap();
        assert_eq!(result.page_count, Some(0));
        assert_eq!(result.line_count, 0);
        assert_eq!(result.full_text, "");
    }

    /// Records how many page images still exist each time the engine runs.
    struct PageProbe {
        pages: Vec<PathBuf>,
        alive: Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl OcrProvider for PageProbe {
        fn name(&self) -> &str {
            "probe"
        }

        fn confidence_scale(&self) -> ConfidenceScale {
            ConfidenceScale::Fraction
        }

        async fn detect(&self, _image_path: &Path) -> Result<Vec<RawDetection>, OcrError> {
            let alive = self.pages.iter().filter(|p| p.exists()).count();
            self.alive.lock().unwrap().push(alive);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_page_images_released_one_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = touch(dir.path(), "libro.pdf");
        let names = vec!["a.png", "b.png", "c.png"];
        let probe = Arc::new(PageProbe {
            pages: names.iter().map(|n| dir.path().join(n)).collect(),
            alive: Mutex::new(Vec::new()),
        });
        let ex = Extractor::new(
            OracleHandle::from_provider(probe.clone()),
            Arc::new(ScratchRasterizer { dir: dir.path().into(), pages: names }),
        );

        ex.extract_document(&pdf).await.unwrap();
        assert_eq!(*probe.alive.lock().unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_is_document() {
        assert!(is_document(Path::new("a/B.PDF")));
        assert!(!is_document(Path::new("scan.png")));
        assert!(!is_document(Path::new("pdf")));
    }
}
