//! PaddleOCR sidecar provider.
//!
//! The sidecar wraps the deep-learning OCR library behind HTTP:
//! `POST /ocr` takes a multipart `file` plus `lang` and answers with one
//! entry per detected line.

use super::{ConfidenceScale, OcrProvider, RawDetection, RawGeometry};
use crate::error::OcrError;
use crate::schema::Quad;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Sidecar response entry (private deserialization type).
#[derive(Debug, Deserialize)]
struct PaddleLine {
    text: String,
    confidence: f64,
    bbox: Quad,
}

pub struct PaddleSidecarProvider {
    url: String,
    language: String,
    client: reqwest::Client,
}

impl PaddleSidecarProvider {
    /// Probe `GET {url}/health` before handing out the provider.
    pub async fn init(url: &str, language: &str) -> Result<Self, OcrError> {
        let url = url.trim_end_matches('/').to_string();
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("{}/health", url))
            .send()
            .await
            .map_err(|e| OcrError::unavailable("paddle", format!("sidecar at {} unreachable: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(OcrError::unavailable(
                "paddle",
                format!("sidecar health check returned {}", resp.status()),
            ));
        }

        info!("PaddleSidecarProvider: sidecar at {} is healthy", url);
        Ok(Self {
            url,
            language: language.to_string(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl OcrProvider for PaddleSidecarProvider {
    fn name(&self) -> &str {
        "paddle"
    }

    fn confidence_scale(&self) -> ConfidenceScale {
        ConfidenceScale::Fraction
    }

    async fn detect(&self, image_path: &Path) -> Result<Vec<RawDetection>, OcrError> {
        use reqwest::multipart::{Form, Part};

        let data = tokio::fs::read(image_path)
            .await
            .map_err(|e| OcrError::image_load(image_path, e))?;
        let filename = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        debug!("PaddleSidecarProvider: sending {} ({} bytes)", filename, data.len());

        let form = Form::new()
            .part("file", Part::bytes(data).file_name(filename))
            .text("lang", self.language.clone());

        let response = self
            .client
            .post(format!("{}/ocr", self.url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::engine("paddle", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(OcrError::engine(
                "paddle",
                format!("sidecar error ({}): {}", status, error_text),
            ));
        }

        let body = response.text().await.map_err(|e| OcrError::engine("paddle", e))?;
        parse_response(&body)
    }
}

/// Parse a sidecar reply. `null` means the engine found nothing.
fn parse_response(body: &str) -> Result<Vec<RawDetection>, OcrError> {
    let lines: Option<Vec<PaddleLine>> = serde_json::from_str(body)
        .map_err(|e| OcrError::engine("paddle", format!("invalid sidecar JSON: {}", e)))?;

    Ok(lines
        .unwrap_or_default()
        .into_iter()
        .map(|l| RawDetection {
            text: l.text,
            confidence: l.confidence,
            geometry: RawGeometry::Quad(l.bbox),
        })
        .collect())
}
