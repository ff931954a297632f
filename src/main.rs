//! OCR Extractor - HTTP front end for OCR text extraction and box visualization.

mod artifacts;
mod batch;
mod config;
mod error;
mod extractor;
mod formatter;
mod ocr;
mod overlay;
mod rasterizer;
mod schema;
mod scratch;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use batch::{BatchInput, BatchRow};
use config::AppConfig;
use error::OcrError;
use extractor::Extractor;
use ocr::OracleHandle;
use overlay::{LabelFont, OverlayRenderer};
use rasterizer::PdfRasterizer;
use schema::ExtractionResult;
use scratch::ScratchDir;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    extractor: Extractor,
    overlay: OverlayRenderer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    std::fs::create_dir_all(&config.output_dir)?;
    std::fs::create_dir_all(&config.upload_dir)?;
    info!(
        "OCR engine: {} (lang={}), outputs in {:?}",
        config.ocr.engine.as_str(),
        config.ocr.language,
        config.output_dir
    );

    // Engine is initialized lazily on the first request
    let oracle = OracleHandle::new(config.ocr.clone());
    let rasterizer = PdfRasterizer::new(
        config.pdftoppm_bin.clone(),
        config.raster_scale,
        config.raster_dir.clone(),
    );

    let font = match &config.font_path {
        Some(path) => match LabelFont::load(path) {
            Ok(font) => {
                info!("Overlay label font: {:?}", path);
                Some(Arc::new(font))
            }
            Err(e) => {
                warn!("Overlay labels will have no glyphs: {}", e);
                None
            }
        },
        None => {
            warn!("No label font found; set OCR_FONT_PATH to draw overlay label text");
            None
        }
    };

    let state = AppState {
        extractor: Extractor::new(oracle.clone(), Arc::new(rasterizer)),
        overlay: OverlayRenderer::new(oracle, font),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/extract", post(extract_text))
        .route("/api/visualize", post(visualize_boxes))
        .route("/api/batch", post(batch_process))
        .route("/api/results", get(list_results))
        .route("/api/results/:filename", get(get_result))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Server shutting down...");
}

// ============================================================================
// Handlers
// ============================================================================

type ApiError = (StatusCode, String);

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

#[derive(Serialize)]
struct ExtractResponse {
    #[serde(flatten)]
    result: ExtractionResult,
    artifacts: artifacts::ArtifactFiles,
    processed_at: chrono::DateTime<chrono::Utc>,
}

/// Extract text from an uploaded image or PDF and persist its artifacts.
async fn extract_text(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let upload = receive_single(multipart, &state.config).await?;
    info!("Extracting text from {}", upload.filename);

    let result = state
        .extractor
        .extract_path(&upload.path)
        .await
        .map_err(|e| ocr_failure(&upload.filename, e))?;

    let files = artifacts::write_artifacts(&state.config.output_dir, &upload.filename, &result)
        .map_err(|e| {
            error!("Failed to save results for {}: {:#}", upload.filename, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to save results: {}", e))
        })?;

    info!("Extracted {} lines from {}", result.line_count, upload.filename);
    Ok(Json(ExtractResponse {
        result,
        artifacts: files,
        processed_at: chrono::Utc::now(),
    }))
}

#[derive(Serialize)]
struct VisualizeResponse {
    filename: String,
    output_file: String,
    download_url: String,
}

/// Draw detection boxes on an uploaded image.
async fn visualize_boxes(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<VisualizeResponse>, ApiError> {
    let upload = receive_single(multipart, &state.config).await?;

    let output_file = artifacts::overlay_name(&upload.filename);
    let output_path = state.config.output_dir.join(&output_file);

    state
        .overlay
        .render_overlay(&upload.path, &output_path)
        .await
        .map_err(|e| ocr_failure(&upload.filename, e))?;

    Ok(Json(VisualizeResponse {
        filename: upload.filename,
        download_url: format!("/api/results/{}", output_file),
        output_file,
    }))
}

#[derive(Serialize)]
struct BatchResponse {
    total_files: usize,
    success_count: usize,
    failure_count: usize,
    results: Vec<BatchRow>,
    processing_time: String,
    summary_file: String,
}

/// Process every uploaded `files` field in order and export a CSV summary.
async fn batch_process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let started = Instant::now();

    let mut inputs = Vec::new();
    while let Some(upload) = next_upload(&mut multipart, "files", &state.config).await? {
        inputs.push(BatchInput {
            filename: upload.filename,
            path: upload.path,
            _scratch: Some(upload.dir),
        });
    }
    if inputs.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No files uploaded".to_string()));
    }

    let rows = batch::process_batch(&state.extractor, &state.config.output_dir, inputs).await;

    let csv = batch::to_csv(&rows).map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to build summary: {}", e))
    })?;
    tokio::fs::write(state.config.output_dir.join(batch::SUMMARY_FILE), csv)
        .await
        .map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to save summary: {}", e))
        })?;

    let failure_count = rows.iter().filter(|r| r.failed).count();
    info!(
        "Batch complete: {} files, {} failed",
        rows.len(),
        failure_count
    );

    Ok(Json(BatchResponse {
        total_files: rows.len(),
        success_count: rows.len() - failure_count,
        failure_count,
        results: rows,
        processing_time: format!("{:.2?}", started.elapsed()),
        summary_file: batch::SUMMARY_FILE.to_string(),
    }))
}

#[derive(Serialize)]
struct ResultListResponse {
    count: usize,
    files: Vec<artifacts::ResultFile>,
}

/// List saved result files, newest first.
async fn list_results(
    State(state): State<AppState>,
) -> Result<Json<ResultListResponse>, ApiError> {
    let files = artifacts::list_results(&state.config.output_dir).map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to read outputs directory: {}", e))
    })?;
    Ok(Json(ResultListResponse {
        count: files.len(),
        files,
    }))
}

/// Serve a saved result file.
async fn get_result(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = scratch::base_name(&filename);
    let path = state.config.output_dir.join(&name);

    let data = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StatusCode::NOT_FOUND
        } else {
            error!("Failed to read {:?}: {}", path, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    Ok(([(header::CONTENT_TYPE, artifacts::content_type(&name))], data))
}

// ============================================================================
// Helper functions
// ============================================================================

/// An uploaded file stored in its own scratch directory under its client name.
struct Upload {
    filename: String,
    path: PathBuf,
    dir: ScratchDir,
}

/// Read the first `file` field of a request.
async fn receive_single(mut multipart: Multipart, config: &AppConfig) -> Result<Upload, ApiError> {
    next_upload(&mut multipart, "file", config)
        .await?
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "No file uploaded".to_string()))
}

/// Store the next multipart field named `field_name`, skipping other fields.
async fn next_upload(
    multipart: &mut Multipart,
    field_name: &str,
    config: &AppConfig,
) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() != Some(field_name) {
            continue;
        }

        let filename = scratch::base_name(field.file_name().unwrap_or("upload"));
        let data = field.bytes().await.map_err(|e| {
            (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
        })?;
        if data.is_empty() {
            return Err((StatusCode::BAD_REQUEST, format!("Uploaded file {} is empty", filename)));
        }

        let dir = ScratchDir::create_in(&config.upload_dir, "upload").map_err(internal)?;
        let path = dir.child(&filename);
        tokio::fs::write(&path, &data).await.map_err(internal)?;

        info!("Received file: {} ({} bytes)", filename, data.len());
        return Ok(Some(Upload { filename, path, dir }));
    }

    Ok(None)
}

fn internal(e: std::io::Error) -> ApiError {
    error!("Upload storage failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload".to_string())
}

fn ocr_failure(filename: &str, e: OcrError) -> ApiError {
    let status = e.status_code();
    if status.is_server_error() {
        error!("Processing {} failed: {}", filename, e);
    } else {
        warn!("Rejected {}: {}", filename, e);
    }
    (status, e.to_string())
}
