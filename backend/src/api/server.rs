//! HTTP Server for the submission validation API.
//!
//! # API Endpoints
//!
//! | Method | Path                                    | Description                     |
//! |--------|-----------------------------------------|---------------------------------|
//! | GET    | `/health`                               | Health check                    |
//! | POST   | `/api/surveys/{survey_id}/submissions`  | Upload and validate a file      |
//! | GET    | `/api/submissions/{id}`                 | Submission and its messages     |
//! | POST   | `/api/submissions/{id}/accept`          | Accept a validated submission   |
//! | POST   | `/api/submissions/{id}/reject`          | Reject a submission             |
//! | PUT    | `/api/surveys/{survey_id}/species`      | Set survey species              |
//! | GET    | `/api/logs`                             | SSE stream for real-time logs   |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post, put},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::LogBroadcaster;
use super::types::{error_response, SpeciesRequest, SubmissionDetail, SubmissionResponse};
use crate::error::{RepositoryError, ServerError, ServerResult, TrackerError};
use crate::models::{Submission, SubmissionKind, SurveySpecies, TemplateIdentity};
use crate::store::{SubmissionRepository, SurveyRepository};
use crate::submission::{SubmissionTracker, Upload};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<SubmissionTracker>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub surveys: Arc<dyn SurveyRepository>,
    pub logs: Arc<LogBroadcaster>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Tracker(TrackerError::Repository(RepositoryError::SubmissionNotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            ServerError::Tracker(TrackerError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ServerError::Tracker(TrackerError::SurveyMismatch { .. }) => StatusCode::BAD_REQUEST,
            ServerError::Tracker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

/// Build the router over the given state.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/surveys/{survey_id}/submissions", post(upload_submission))
        .route("/api/surveys/{survey_id}/species", put(set_species))
        .route("/api/submissions/{id}", get(get_submission))
        .route("/api/submissions/{id}/accept", post(accept_submission))
        .route("/api/submissions/{id}/reject", post(reject_submission))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "SIMS validation server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sims-validate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.logs.subscribe();

    // Lagged receivers just skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload a file for a survey and validate it right away
async fn upload_submission(
    State(state): State<AppState>,
    Path(survey_id): Path<i64>,
    mut multipart: Multipart,
) -> ServerResult<Json<SubmissionResponse>> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut template_name: Option<String> = None;
    let mut template_version: Option<String> = None;
    let mut kind = SubmissionKind::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mimetype = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file = Some((file_name, mimetype, bytes.to_vec()));
            }
            "template_name" | "template_version" | "kind" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let value = value.trim().to_string();
                match name.as_str() {
                    "template_name" => template_name = Some(value).filter(|v| !v.is_empty()),
                    "template_version" => template_version = Some(value).filter(|v| !v.is_empty()),
                    _ => kind = parse_kind(&value)?,
                }
            }
            _ => {}
        }
    }

    let (file_name, declared_mimetype, bytes) =
        file.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;

    let declared_template = match (template_name, template_version) {
        (Some(name), Some(version)) => Some(TemplateIdentity { name, version }),
        (None, None) => None,
        _ => {
            return Err(ServerError::BadRequest(
                "template_name and template_version must be given together".to_string(),
            ))
        }
    };

    tracing::info!(survey_id, file_name = %file_name, bytes = bytes.len(), "Upload received");

    let submission = state
        .tracker
        .upload(Upload {
            survey_id,
            kind,
            file_name,
            bytes,
            declared_mimetype,
            declared_template,
        })
        .await?;

    let outcome = state.tracker.validate_file(submission.id, survey_id).await?;
    let messages = state.submissions.get_submission_messages(submission.id).await?;

    Ok(Json(SubmissionResponse::new(outcome, messages)))
}

fn parse_kind(value: &str) -> ServerResult<SubmissionKind> {
    match value.to_ascii_uppercase().as_str() {
        "" | "SUMMARY" => Ok(SubmissionKind::Summary),
        "OCCURRENCE" => Ok(SubmissionKind::Occurrence),
        other => Err(ServerError::BadRequest(format!("Unknown submission kind '{}'", other))),
    }
}

async fn get_submission(State(state): State<AppState>, Path(id): Path<i64>) -> ServerResult<Json<SubmissionDetail>> {
    let submission = state.submissions.find_submission_by_id(id).await?;
    let messages = state.submissions.get_submission_messages(id).await?;
    Ok(Json(SubmissionDetail { submission, messages }))
}

async fn accept_submission(State(state): State<AppState>, Path(id): Path<i64>) -> ServerResult<Json<Submission>> {
    Ok(Json(state.tracker.accept(id).await?))
}

async fn reject_submission(State(state): State<AppState>, Path(id): Path<i64>) -> ServerResult<Json<Submission>> {
    Ok(Json(state.tracker.reject(id).await?))
}

async fn set_species(
    State(state): State<AppState>,
    Path(survey_id): Path<i64>,
    Json(request): Json<SpeciesRequest>,
) -> ServerResult<Json<SurveySpecies>> {
    let species: SurveySpecies = request.into();
    state.surveys.set_species_data(survey_id, species.clone()).await?;
    Ok(Json(species))
}
