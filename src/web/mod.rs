//! HTTP surface: the camera page and the session API behind it.

pub mod handlers;
pub mod session;

pub use session::{Dimensions, Rating, SessionStore, SessionView, UiState};

use crate::app::App;
use crate::Error;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<App>,
    pub sessions: SessionStore,
}

pub fn router(app: Arc<App>, sessions: SessionStore) -> Router {
    let body_limit = app.max_upload_bytes();

    Router::new()
        .route("/", get(handlers::index))
        .route("/healthz", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/sessions/:id/capture", post(handlers::capture))
        .route("/api/sessions/:id/analyze", post(handlers::analyze))
        .route("/api/sessions/:id/reset", post(handlers::reset))
        .route("/api/sessions/:id/feedback", post(handlers::feedback))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { app, sessions })
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::BadRequest(_) | Error::Image(_) | Error::Base64(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
