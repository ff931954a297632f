//! Debug overlay: detection outlines and confidence labels drawn onto a copy of the image.

use crate::error::OcrError;
use crate::ocr::{ConfidenceScale, OracleHandle, RawDetection};
use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

const LABEL_PX: f32 = 16.0;
/// Glyph cell used to size label backgrounds when no font is loaded.
const FALLBACK_CELL: (u32, u32) = (7, 13);
/// Label baseline sits this far above the detection's top-left corner...
const LABEL_OFFSET: i32 = 10;
/// ...but never closer than this to the top of the image.
const LABEL_MIN_BASELINE: i32 = 20;
const LABEL_PADDING: i32 = 5;

/// TrueType font used for label glyphs.
pub struct LabelFont {
    font: FontVec,
    scale: PxScale,
}

impl LabelFont {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)?;
        let font = FontVec::try_from_vec(data)
            .map_err(|e| anyhow::anyhow!("invalid font {}: {}", path.display(), e))?;
        Ok(Self {
            font,
            scale: PxScale::from(LABEL_PX),
        })
    }

    fn measure(&self, text: &str) -> (u32, u32) {
        text_size(self.scale, &self.font, text)
    }
}

/// Renders overlays by re-running the OCR engine on the source image.
#[derive(Clone)]
pub struct OverlayRenderer {
    oracle: OracleHandle,
    font: Option<Arc<LabelFont>>,
}

impl OverlayRenderer {
    pub fn new(oracle: OracleHandle, font: Option<Arc<LabelFont>>) -> Self {
        Self { oracle, font }
    }

    /// Draw every raw detection (unfiltered) and save to `output_path`.
    ///
    /// Fails with [`OcrError::ImageLoad`] before touching the engine or the
    /// output path when `image_path` is not a readable image.
    pub async fn render_overlay(&self, image_path: &Path, output_path: &Path) -> Result<PathBuf, OcrError> {
        let mut image = image::open(image_path)
            .map_err(|e| OcrError::image_load(image_path, e))?
            .to_rgb8();

        let provider = self.oracle.get().await?;
        let detections = provider.detect(image_path).await?;
        let scale = provider.confidence_scale();

        for detection in &detections {
            draw_detection(&mut image, detection, scale, self.font.as_deref());
        }
        debug!("Drew {} detections on {}", detections.len(), image_path.display());

        save(&image, output_path)?;
        info!("Overlay saved to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

fn save(image: &RgbImage, output_path: &Path) -> Result<(), OcrError> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let format = ImageFormat::from_path(output_path).unwrap_or(ImageFormat::Png);
    image
        .save_with_format(output_path, format)
        .map_err(|e| OcrError::Render {
            path: output_path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Label text shown above a detection, confidence rescaled to `[0, 1]`.
pub fn label_for(detection: &RawDetection, scale: ConfidenceScale) -> String {
    format!("{} ({:.2})", detection.text, scale.to_unit(detection.confidence))
}

fn draw_detection(image: &mut RgbImage, detection: &RawDetection, scale: ConfidenceScale, font: Option<&LabelFont>) {
    let quad = detection.geometry.to_quad();

    // 2px outline
    for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
        for i in 0..4 {
            let a = quad[i];
            let b = quad[(i + 1) % 4];
            draw_line_segment_mut(
                image,
                (a[0] as f32 + dx, a[1] as f32 + dy),
                (b[0] as f32 + dx, b[1] as f32 + dy),
                BOX_COLOR,
            );
        }
    }

    let label = label_for(detection, scale);
    let (width, height) = match font {
        Some(font) => font.measure(&label),
        None => (FALLBACK_CELL.0 * label.chars().count() as u32, FALLBACK_CELL.1),
    };

    let x = quad[0][0].round() as i32;
    let baseline = label_baseline(quad[0][1]);
    let text_top = baseline - height as i32;

    let background = Rect::at(x, text_top - LABEL_PADDING)
        .of_size(width.max(1), height + 2 * LABEL_PADDING as u32);
    draw_filled_rect_mut(image, background, LABEL_BACKGROUND);

    if let Some(font) = font {
        draw_text_mut(image, LABEL_COLOR, x, text_top, font.scale, &font.font, &label);
    }
}

fn label_baseline(top: f64) -> i32 {
    (top.round() as i32 - LABEL_OFFSET).max(LABEL_MIN_BASELINE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::testing::{word, ScriptedProvider};

    fn renderer(provider: ScriptedProvider) -> OverlayRenderer {
        OverlayRenderer::new(OracleHandle::from_provider(Arc::new(provider)), None)
    }

    fn white_image(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_image_is_load_error_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output.png");
        let r = renderer(ScriptedProvider::new(ConfidenceScale::Percent));

        let err = r
            .render_overlay(Path::new("/nonexistent/path/image.png"), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::ImageLoad { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_draws_raw_detections_and_returns_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = white_image(dir.path(), "hoja.png");
        let output = dir.path().join("boxes_hoja.png");
        // Zero confidence and blank text are still drawn.
        let provider = ScriptedProvider::new(ConfidenceScale::Percent)
            .answer("hoja.png", vec![word(" ", 0.0, 10.0, 40.0)]);

        let returned = renderer(provider).render_overlay(&input, &output).await.unwrap();
        assert_eq!(returned, output);

        let drawn = image::open(&output).unwrap().to_rgb8();
        assert_eq!(drawn.dimensions(), (200, 100));
        // Top edge of the 40x12 box at (10, 40).
        assert_eq!(*drawn.get_pixel(30, 40), BOX_COLOR);
        // Inside the box stays untouched.
        assert_eq!(*drawn.get_pixel(30, 46), Rgb([255, 255, 255]));
    }

    #[tokio::test]
    async fn test_no_detections_still_writes_copy() {
        let dir = tempfile::tempdir().unwrap();
        let input = white_image(dir.path(), "vacia.png");
        let output = dir.path().join("out").join("boxes_vacia.png");

        renderer(ScriptedProvider::new(ConfidenceScale::Percent))
            .render_overlay(&input, &output)
            .await
            .unwrap();
        assert!(output.exists());
    }

    #[test]
    fn test_label_format() {
        assert_eq!(label_for(&word("Hola", 87.0, 0.0, 0.0), ConfidenceScale::Percent), "Hola (0.87)");
        assert_eq!(label_for(&word("ruido", -1.0, 0.0, 0.0), ConfidenceScale::Percent), "ruido (0.00)");
    }

    #[test]
    fn test_label_baseline_clamped_to_top() {
        assert_eq!(label_baseline(100.0), 90);
        assert_eq!(label_baseline(25.0), 20);
        assert_eq!(label_baseline(0.0), 20);
    }

    #[test]
    fn test_font_load_missing_file() {
        assert!(LabelFont::load(Path::new("/nonexistent/font.ttf")).is_err());
    }
}
