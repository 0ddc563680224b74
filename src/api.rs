use crate::config::{ApiConfig, AuthConfig};
use crate::error::ApiError;
use crate::files::FileResolver;
use crate::store::DirectoryStore;
use crate::{auth, maintenance, robots};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DirectoryStore>,
    pub resolver: Arc<FileResolver>,
    pub auth: AuthConfig,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/auth", auth::router())
        .nest("/robots", robots::router())
        .nest("/maintenance", maintenance::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "report-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    // Check database connectivity
    match sqlx::query("SELECT 1").fetch_one(state.store.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Stream a resolved file back as an attachment.
///
/// Bytes go out through an async reader stream, never buffered whole.
/// The content type is guessed from the filename extension.
pub(crate) async fn file_attachment(path: &Path, filename: &str) -> Result<Response, ApiError> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("file not found".to_string()));
        }
        Err(e) => return Err(ApiError::Internal(e.into())),
    };

    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .len();

    let mime = mime_guess::from_path(filename).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::CONTENT_DISPOSITION, attachment_disposition(filename));

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

/// Serve an in-memory ZIP archive as an attachment.
pub(crate) fn zip_attachment(bytes: Vec<u8>, filename: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(bytes.len() as u64),
    );
    headers.insert(header::CONTENT_DISPOSITION, attachment_disposition(filename));

    (headers, bytes).into_response()
}

fn attachment_disposition(filename: &str) -> HeaderValue {
    // Quoted-string escaping: backslash first, then the quote itself
    let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_str(&format!("attachment; filename=\"{escaped}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Start the report API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting report API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_zip_attachment_headers() {
        let resp = zip_attachment(vec![1, 2, 3], "robot-1_reports.zip");
        assert_eq!(resp.status(), StatusCode::OK);

        let headers = resp.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
        assert_eq!(headers[header::CONTENT_LENGTH], "3");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"robot-1_reports.zip\""
        );
    }

    #[tokio::test]
    async fn test_file_attachment_headers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("report.csv");
        fs::write(&path, b"a,b\n").unwrap();

        let resp = file_attachment(&path, "report.csv").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "4");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.csv\""
        );
    }

    #[tokio::test]
    async fn test_file_attachment_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = file_attachment(&tmp.path().join("gone.csv"), "gone.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_unknown_extension_falls_back_to_octet_stream() {
        let mime = mime_guess::from_path("report.qqq").first_or_octet_stream();
        assert_eq!(mime.essence_str(), "application/octet-stream");
    }

    #[test]
    fn test_attachment_disposition_escapes_quoted_string() {
        assert_eq!(
            attachment_disposition("ro\"bot.csv"),
            "attachment; filename=\"ro\\\"bot.csv\""
        );
        assert_eq!(
            attachment_disposition("back\\slash.csv"),
            "attachment; filename=\"back\\\\slash.csv\""
        );
    }

    #[test]
    fn test_attachment_disposition_control_char_falls_back() {
        // Bytes a header value cannot carry drop the filename entirely
        assert_eq!(attachment_disposition("bad\nname.csv"), "attachment");
    }
}
