use super::session::{Dimensions, Rating, SessionView, UiState};
use super::AppState;
use crate::image::{self, CapturedImage};
use crate::{Error, Result};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Multipart field carrying the camera frame.
pub const IMAGE_FIELD: &str = "image";

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let view = state.sessions.create();
    info!("Created session {}", view.session_id);
    (StatusCode::CREATED, Json(view))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    Ok(Json(state.sessions.view(id)?))
}

pub async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.sessions.remove(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>> {
    let mut frame = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::BadRequest(format!("Failed to read image: {}", e)))?;
            frame = Some(bytes);
            break;
        }
    }

    let frame = frame
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| Error::BadRequest(format!("Missing '{}' field", IMAGE_FIELD)))?;

    let captured = tokio::task::spawn_blocking(move || CapturedImage::from_bytes(&frame))
        .await
        .map_err(|e| Error::Invariant(format!("Image decoding task join error: {}", e)))??;
    let dimensions = Dimensions {
        width: captured.width(),
        height: captured.height(),
    };

    let payload = image::encode(captured).await?;
    info!("Session {} captured {}x{} frame", id, dimensions.width, dimensions.height);

    Ok(Json(state.sessions.update(id, |ui| ui.capture(payload, dimensions))?))
}

/// Runs the whole pipeline before responding; the session sits in
/// `Analyzing` meanwhile and rejects other actions.
///
/// The run lives in its own task, so a client that disconnects mid-analysis
/// still finds the session in `Result` afterwards.
pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let (_, payload) = state.sessions.update_with(id, UiState::begin_analysis)?;

    info!("Session {} analyzing", id);
    let AppState { app, sessions } = state;
    let run = tokio::spawn(async move {
        let prediction = app.guess_age(&payload).await;
        sessions.update(id, |ui| ui.complete(prediction))
    });

    let view = run
        .await
        .map_err(|e| Error::Invariant(format!("Analysis task join error: {}", e)))??;
    Ok(Json(view))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    Ok(Json(state.sessions.update(id, UiState::reset)?))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: Rating,
}

pub async fn feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<SessionView>> {
    let view = state.sessions.update(id, |ui| ui.rate(request.rating))?;
    info!("Session {} rated the estimate: {}", id, request.rating.label());
    Ok(Json(view))
}
