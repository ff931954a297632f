//! Service configuration.
//!
//! Read from the environment (after `.env` is loaded). Every value has a
//! default; malformed values fail startup.

use crate::ocr::{OcrProviderKind, OcrSettings};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_MB: usize = 50;
const DEFAULT_RASTER_SCALE: u32 = 2;
const MAX_RASTER_SCALE: u32 = 8;

/// Fonts tried for overlay labels when `OCR_FONT_PATH` is not set.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub output_dir: PathBuf,
    pub upload_dir: PathBuf,
    /// Where page images are rendered.
    pub raster_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub ocr: OcrSettings,
    pub pdftoppm_bin: String,
    /// Linear upscale factor applied when rasterizing documents.
    pub raster_scale: u32,
    pub font_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = parse(&get("PORT", &DEFAULT_PORT.to_string()), "PORT")?;
        let max_upload_mb: usize =
            parse(&get("MAX_UPLOAD_MB", &DEFAULT_MAX_UPLOAD_MB.to_string()), "MAX_UPLOAD_MB")?;

        let engine_name = get("OCR_ENGINE", "tesseract");
        let engine = OcrProviderKind::parse(&engine_name).with_context(|| {
            format!("Unknown OCR_ENGINE '{}'. Available: tesseract, paddle", engine_name)
        })?;

        let raster_scale: u32 =
            parse(&get("RASTER_SCALE", &DEFAULT_RASTER_SCALE.to_string()), "RASTER_SCALE")?;
        if !(1..=MAX_RASTER_SCALE).contains(&raster_scale) {
            anyhow::bail!("RASTER_SCALE must be between 1 and {}, got {}", MAX_RASTER_SCALE, raster_scale);
        }

        let default_raster_dir = std::env::temp_dir().join("ocr-extractor-pages");

        Ok(Self {
            port,
            output_dir: PathBuf::from(get("OUTPUT_DIR", "outputs")),
            upload_dir: PathBuf::from(get("UPLOAD_DIR", "uploads")),
            raster_dir: PathBuf::from(get("RASTER_DIR", &default_raster_dir.to_string_lossy())),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            ocr: OcrSettings {
                engine,
                language: get("OCR_LANG", "spa"),
                tesseract_bin: get("TESSERACT_BIN", "tesseract"),
                paddle_url: get("PADDLE_OCR_URL", "http://localhost:8866"),
            },
            pdftoppm_bin: get("PDFTOPPM_BIN", "pdftoppm"),
            raster_scale,
            font_path: lookup("OCR_FONT_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .or_else(default_font_path),
        })
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid {}: '{}'", key, value))
}

fn default_font_path() -> Option<PathBuf> {
    FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.output_dir, PathBuf::from("outputs"));
        assert_eq!(cfg.upload_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.ocr.engine, OcrProviderKind::Tesseract);
        assert_eq!(cfg.ocr.language, "spa");
        assert_eq!(cfg.raster_scale, 2);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PORT", "9000"),
            ("OCR_ENGINE", "paddle"),
            ("OCR_LANG", "es"),
            ("PADDLE_OCR_URL", "http://ocr:8866"),
            ("RASTER_SCALE", "3"),
            ("OCR_FONT_PATH", "/fonts/label.ttf"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.ocr.engine, OcrProviderKind::Paddle);
        assert_eq!(cfg.ocr.language, "es");
        assert_eq!(cfg.ocr.paddle_url, "http://ocr:8866");
        assert_eq!(cfg.raster_scale, 3);
        assert_eq!(cfg.font_path, Some(PathBuf::from("/fonts/label.ttf")));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let cfg = config(&[("PORT", "  "), ("OCR_LANG", "")]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.ocr.language, "spa");
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("PORT", "http")]).is_err());
        assert!(config(&[("OCR_ENGINE", "easyocr")]).is_err());
        assert!(config(&[("RASTER_SCALE", "0")]).is_err());
        assert!(config(&[("RASTER_SCALE", "12")]).is_err());
    }
}
