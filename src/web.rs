//! Browser front-end: the upload page plus a JSON endpoint that runs the
//! caption workflow.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::error::{Failure, FailureKind};
use crate::workflow::{CaptionWorkflow, Upload, WorkflowOutcome};

/// Room for multipart boundaries and headers on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct AppState {
    pub workflow: CaptionWorkflow,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AudioPayload {
    pub mime_type: String,
    pub data_base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub caption: String,
    pub model: String,
    pub processing_time_ms: u128,
    pub audio: Option<AudioPayload>,
    pub speech_error: Option<String>,
    /// Data URI of the resized display copy.
    pub preview: Option<String>,
}

impl From<WorkflowOutcome> for CaptionResponse {
    fn from(outcome: WorkflowOutcome) -> Self {
        Self {
            caption: outcome.caption.text,
            model: outcome.caption.model,
            processing_time_ms: outcome.elapsed.as_millis(),
            audio: outcome.audio.map(|audio| AudioPayload {
                mime_type: audio.mime_type().to_string(),
                data_base64: general_purpose::STANDARD.encode(audio.bytes()),
            }),
            speech_error: outcome.speech_error.map(|e| e.to_string()),
            preview: outcome.preview.map(|p| p.data_uri()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// A [`Failure`] rendered as an HTTP response.
pub struct ApiError(Failure);

impl From<Failure> for ApiError {
    fn from(failure: Failure) -> Self {
        Self(failure)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            FailureKind::InvalidFormat => StatusCode::BAD_REQUEST,
            FailureKind::MissingCredential => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::ServiceError | FailureKind::SynthesisError => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.0.kind().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .workflow
        .validator()
        .max_bytes()
        .saturating_add(MULTIPART_OVERHEAD);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/caption", post(caption_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn caption_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiError> {
    let max_bytes = state.workflow.validator().max_bytes();
    let upload = read_upload(&mut multipart, max_bytes).await?;

    tracing::info!(
        file_name = upload.file_name.as_deref().unwrap_or("<none>"),
        size = upload.bytes.len(),
        "Caption requested"
    );

    let outcome = state.workflow.run(upload).await?;
    Ok(Json(CaptionResponse::from(outcome)))
}

/// Takes the `image` part, or failing that the first part that carries a file.
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<Upload, Failure> {
    let to_failure = move |err: MultipartError| unreadable(err, max_bytes);

    while let Some(field) = multipart.next_field().await.map_err(to_failure)? {
        if field.name() != Some("image") && field.file_name().is_none() {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(to_failure)?;

        return Ok(Upload {
            bytes,
            file_name,
            content_type,
        });
    }

    Err(Failure::InvalidFormat("no image was uploaded".to_string()))
}

fn unreadable(err: MultipartError, max_bytes: usize) -> Failure {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Failure::InvalidFormat(format!("file exceeds the {max_bytes} byte limit"));
    }
    Failure::InvalidFormat(format!("could not read upload: {}", err.body_text()))
}
