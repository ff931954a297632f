//! Error taxonomy for the OCR pipeline.

use axum::http::StatusCode;
use std::path::PathBuf;

/// Errors surfaced by extraction, rasterization and overlay rendering.
///
/// An empty OCR result is never an error; it is a zero-line
/// [`ExtractionResult`](crate::schema::ExtractionResult).
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// The OCR engine could not be initialized. Fatal for the current operation.
    #[error("OCR engine '{engine}' unavailable: {reason}")]
    Unavailable { engine: String, reason: String },

    /// The input could not be opened or decoded as an image.
    #[error("Could not load image from {}: {reason}", path.display())]
    ImageLoad { path: PathBuf, reason: String },

    /// The engine ran but did not produce a usable answer.
    #[error("OCR engine '{engine}' failed: {reason}")]
    Engine { engine: String, reason: String },

    /// The document could not be turned into page images.
    #[error("Failed to rasterize {}: {reason}", path.display())]
    Rasterize { path: PathBuf, reason: String },

    /// The annotated image could not be written.
    #[error("Failed to render overlay to {}: {reason}", path.display())]
    Render { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OcrError {
    pub fn image_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ImageLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn engine(engine: impl Into<String>, reason: impl ToString) -> Self {
        Self::Engine {
            engine: engine.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unavailable(engine: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            engine: engine.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rasterize(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Rasterize {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that must abort the whole operation rather than a single page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// HTTP status used by the API layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ImageLoad { .. } => StatusCode::BAD_REQUEST,
            Self::Engine { .. } => StatusCode::BAD_GATEWAY,
            Self::Rasterize { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Render { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
