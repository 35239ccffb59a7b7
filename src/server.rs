//! HTTP wrapper around [`ConversionPipeline`].
//!
//! | Route | Method | Body | Response |
//! |-------|--------|------|----------|
//! | `/upload/`, `/upload` | POST | multipart, field `file` | projected result (see [`ResultView`]) |
//! | `/health` | GET | – | `{"status": "ok", "store": "..."}` |
//!
//! `?view=job_id|folder_url|assets` picks the response shape; the default
//! comes from [`ServerConfig`]. Failures return `{"error", "stage",
//! "retryable"}` with a status that tells input problems (4xx) from
//! deployment problems (5xx).
//!
//! A client that disconnects drops the handler future, which cancels the
//! job: the office process is killed and the temp directory removed.

use crate::convert::ConversionPipeline;
use crate::document::SourceDocument;
use crate::error::{PipelineError, RenderStage};
use crate::output::ResultView;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// HTTP-facing settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Response shape when the request has no `view` parameter.
    pub default_view: ResultView,
    /// Maximum request body size. Default: 50 MiB.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_view: ResultView::AssetList,
            body_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Clone)]
struct AppState {
    pipeline: ConversionPipeline,
    default_view: ResultView,
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    view: Option<String>,
}

/// Error body for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub stage: String,
    pub retryable: bool,
}

fn reject(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            stage: "request".to_string(),
            retryable: false,
        }),
    )
        .into_response()
}

/// HTTP status for a pipeline failure.
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        PipelineError::ReadInput { .. } => StatusCode::BAD_REQUEST,
        PipelineError::Render(e) => match e.stage {
            RenderStage::PdfRasterize => StatusCode::UNPROCESSABLE_ENTITY,
            RenderStage::BridgeUnavailable | RenderStage::PdfEngineUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RenderStage::BridgeFailed | RenderStage::BridgeNoOutput => StatusCode::BAD_GATEWAY,
            RenderStage::Staging => StatusCode::INTERNAL_SERVER_ERROR,
        },
        PipelineError::Publish(_) => StatusCode::BAD_GATEWAY,
        PipelineError::InvalidConfig(_) | PipelineError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = ErrorBody {
            error: self.to_string(),
            stage: self.stage_label().to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router.
pub fn router(pipeline: ConversionPipeline, config: ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let state = AppState {
        pipeline,
        default_view: config.default_view,
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/upload/", post(upload_handler))
        .route("/upload", post(upload_handler))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(
    addr: SocketAddr,
    pipeline: ConversionPipeline,
    config: ServerConfig,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router(pipeline, config)).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "store": state.pipeline.store().name(),
    }))
}

async fn upload_handler(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Response {
    let view = match query.view.as_deref() {
        None => state.default_view,
        Some(v) => match ResultView::parse(v) {
            Some(view) => view,
            None => {
                return reject(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown view '{v}'; expected job_id, folder_url or assets"),
                )
            }
        },
    };

    let document = loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => {
                warn!("Upload request without a '{FILE_FIELD}' field");
                return reject(
                    StatusCode::BAD_REQUEST,
                    format!("No file uploaded (expected multipart field '{FILE_FIELD}')"),
                );
            }
            Err(e) => {
                warn!(error = %e, "Failed to read multipart");
                return reject(e.status(), format!("Failed to read multipart: {e}"));
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        match field.bytes().await {
            Ok(data) => break SourceDocument::new(data, content_type, filename),
            Err(e) => {
                warn!(error = %e, "Failed to read uploaded file");
                return reject(e.status(), format!("Failed to read file: {e}"));
            }
        }
    };

    match state.pipeline.process(document).await {
        Ok(output) => Json(output.project(view)).into_response(),
        Err(e) => e.into_response(),
    }
}
