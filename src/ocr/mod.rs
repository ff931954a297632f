//! Modular OCR oracle abstraction.
//!
//! Defines the [`OcrProvider`] trait and the raw detection types so different
//! OCR backends (the `tesseract` binary, a PaddleOCR sidecar) can be swapped
//! via configuration. [`OracleHandle`] owns the lazily initialized provider
//! shared by every request.

pub mod normalize;
pub mod paddle;
pub mod tesseract;

use crate::error::OcrError;
use crate::schema::Quad;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Native confidence scale of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceScale {
    /// 0..=100 (tesseract).
    Percent,
    /// 0.0..=1.0 (PaddleOCR).
    Fraction,
}

impl ConfidenceScale {
    /// Rescale a native value into `[0, 1]`.
    pub fn to_unit(self, raw: f64) -> f64 {
        let value = match self {
            Self::Percent => raw / 100.0,
            Self::Fraction => raw,
        };
        value.clamp(0.0, 1.0)
    }
}

/// Geometry as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RawGeometry {
    /// Axis-aligned box.
    Box {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
    },
    /// Already a 4-point polygon.
    Quad(Quad),
}

impl RawGeometry {
    /// Corners clockwise from top-left for boxes; polygons pass through unchanged.
    pub fn to_quad(&self) -> Quad {
        match *self {
            Self::Box {
                left,
                top,
                width,
                height,
            } => [
                [left, top],
                [left + width, top],
                [left + width, top + height],
                [left, top + height],
            ],
            Self::Quad(quad) => quad,
        }
    }
}

/// One unfiltered detection straight from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub text: String,
    /// On the engine's native [`ConfidenceScale`].
    pub confidence: f64,
    pub geometry: RawGeometry,
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    fn confidence_scale(&self) -> ConfidenceScale;
    /// Run the engine once on an image. An image without text yields an empty vec.
    async fn detect(&self, image_path: &Path) -> Result<Vec<RawDetection>, OcrError>;
}

/// Known provider identifiers used for configuration lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    Tesseract,
    Paddle,
}

impl OcrProviderKind {
    /// Parse a configuration string into a provider kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Some(Self::Tesseract),
            "paddle" | "paddleocr" => Some(Self::Paddle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::Paddle => "paddle",
        }
    }
}

/// Settings needed to construct a provider.
#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub engine: OcrProviderKind,
    pub language: String,
    pub tesseract_bin: String,
    pub paddle_url: String,
}

/// Process-wide handle to the OCR provider.
///
/// The provider is built on first use and reused afterwards. A failed
/// initialization leaves the cell empty so a later call can try again.
#[derive(Clone)]
pub struct OracleHandle {
    settings: Option<Arc<OcrSettings>>,
    cell: Arc<OnceCell<Arc<dyn OcrProvider>>>,
}

impl OracleHandle {
    pub fn new(settings: OcrSettings) -> Self {
        Self {
            settings: Some(Arc::new(settings)),
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Handle around an already constructed provider.
    #[cfg(test)]
    pub fn from_provider(provider: Arc<dyn OcrProvider>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(provider);
        Self {
            settings: None,
            cell: Arc::new(cell),
        }
    }

    /// Get the provider, initializing it if needed.
    pub async fn get(&self) -> Result<Arc<dyn OcrProvider>, OcrError> {
        let provider = self
            .cell
            .get_or_try_init(|| async {
                let settings = self
                    .settings
                    .as_deref()
                    .ok_or_else(|| OcrError::unavailable("unknown", "no OCR settings configured"))?;
                init_provider(settings).await
            })
            .await?;
        Ok(Arc::clone(provider))
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

async fn init_provider(settings: &OcrSettings) -> Result<Arc<dyn OcrProvider>, OcrError> {
    info!(
        "Initializing OCR engine '{}' (lang={})",
        settings.engine.as_str(),
        settings.language
    );

    let provider: Arc<dyn OcrProvider> = match settings.engine {
        OcrProviderKind::Tesseract => Arc::new(
            tesseract::TesseractProvider::init(&settings.tesseract_bin, &settings.language).await?,
        ),
        OcrProviderKind::Paddle => Arc::new(
            paddle::PaddleSidecarProvider::init(&settings.paddle_url, &settings.language).await?,
        ),
    };

    info!("OCR engine '{}' ready", provider.name());
    Ok(provider)
}
