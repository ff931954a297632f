//! Raw detection → [`DetectedLine`] mapping.
//!
//! Pure functions, no I/O, so the filtering rules can be tested without an engine.

use super::{ConfidenceScale, RawDetection};
use crate::schema::DetectedLine;

/// Map one raw detection to a retained line, or `None` when it must be dropped.
///
/// Dropped: empty/whitespace-only text, or a native confidence that is not
/// strictly positive (NaN included). Retained text is kept verbatim.
pub fn normalize_detection(raw: &RawDetection, scale: ConfidenceScale) -> Option<DetectedLine> {
    if raw.text.trim().is_empty() {
        return None;
    }
    if !(raw.confidence > 0.0) {
        return None;
    }

    Some(DetectedLine {
        text: raw.text.clone(),
        confidence: scale.to_unit(raw.confidence),
        quadrilateral: raw.geometry.to_quad(),
        page: None,
    })
}

/// Normalize a whole engine answer, preserving detection order.
pub fn normalize_all(raw: &[RawDetection], scale: ConfidenceScale) -> Vec<DetectedLine> {
    raw.iter()
        .filter_map(|d| normalize_detection(d, scale))
        .collect()
}
