//! HTTP surface: upload two backups, receive the merged one.
//!
//! Routes:
//! - `GET /ping` - liveness check
//! - `POST /api/merge-db` - multipart upload with fields `main` and `toMerge`,
//!   answered with the merged archive as an attachment
//!
//! All requests share one working directory, so merges are serialized.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::error::{MergeError, MergeResult};
use crate::pipeline::{self, MERGED_ARCHIVE};

/// Multipart field carrying the first backup.
pub const MAIN_FIELD: &str = "main";
/// Multipart field carrying the second backup.
pub const TO_MERGE_FIELD: &str = "toMerge";

/// Error body returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// An error that maps onto an HTTP status.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        ApiError::internal(format!("An error occurred: {}", err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal(format!("An error occurred: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        }
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    work_dir: PathBuf,
    merge_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            merge_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the application router.
pub fn router(config: &ServiceConfig) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/merge-db", post(merge_db))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(&config.work_dir))
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> MergeResult<()> {
    let addr = config.bind_addr()?;
    tokio::fs::create_dir_all(&config.work_dir).await?;
    let app = router(&config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MergeError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, work_dir = %config.work_dir.display(), "starting merge service");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect::<Vec<_>>();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong" }))
}

async fn merge_db(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let _guard = state.merge_lock.lock().await;
    tokio::fs::create_dir_all(&state.work_dir).await?;

    let mut main: Option<PathBuf> = None;
    let mut to_merge: Option<PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart field: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();
        let target = match name.as_str() {
            MAIN_FIELD => state.work_dir.join("main.zip"),
            TO_MERGE_FIELD => state.work_dir.join("toMerge.zip"),
            _ => continue,
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid upload {}: {}", name, e)))?;
        tokio::fs::write(&target, &bytes).await?;

        if name == MAIN_FIELD {
            main = Some(target);
        } else {
            to_merge = Some(target);
        }
    }

    let main = main.ok_or_else(|| ApiError::bad_request(format!("missing field: {}", MAIN_FIELD)))?;
    let to_merge = to_merge
        .ok_or_else(|| ApiError::bad_request(format!("missing field: {}", TO_MERGE_FIELD)))?;

    let work_dir = state.work_dir.clone();
    let output = tokio::task::spawn_blocking(move || {
        pipeline::merge_archives(&work_dir, &main, &to_merge)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Error merging files: {}", e)))??;

    attachment(&output.archive, output.report.total_writes).await
}

async fn attachment(path: &Path, total_writes: u32) -> Result<Response, ApiError> {
    if !path.exists() {
        return Err(ApiError::internal("Merged file not found"));
    }
    let bytes = tokio::fs::read(path).await?;
    let disposition = format!("attachment; filename={}", MERGED_ARCHIVE);

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (
                header::HeaderName::from_static("x-merge-total-writes"),
                total_writes.to_string(),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_error_maps_to_500() {
        let err: ApiError = MergeError::MissingInput("userData.db".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.detail.contains("userData.db"));
    }

    async fn allow_origin(cors_origins: &[&str], origin: &str) -> Option<String> {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let tmp = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            work_dir: tmp.path().to_path_buf(),
            cors_origins: cors_origins.iter().map(|o| o.to_string()).collect(),
            ..ServiceConfig::default()
        };
        let response = router(&config)
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header(header::ORIGIN, origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_cors_allows_listed_origin_only() {
        let listed = ["https://a.example", "\n"];
        assert_eq!(
            allow_origin(&listed, "https://a.example").await.as_deref(),
            Some("https://a.example")
        );
        assert_eq!(allow_origin(&listed, "https://evil.example").await, None);
    }

    #[tokio::test]
    async fn test_cors_without_origins_is_permissive() {
        assert_eq!(
            allow_origin(&[], "https://any.example").await.as_deref(),
            Some("*")
        );
    }
}
