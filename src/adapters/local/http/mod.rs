//! HTTP inbound adapter.
//!
//! Streaming routes require a viewer token, operator routes an admin token.
//! Both checks run before any handler touches state or storage, and the
//! denial is the same whatever the request addresses.

pub mod admin;
mod error;
pub mod range;
mod upload;
pub mod video;

pub use error::ApiError;

use crate::application::cleanup::CleanupService;
use crate::application::delivery::{DeliveryError, DeliveryService};
use crate::application::ingest::IngestionService;
use crate::ports::auth::Authenticator;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub delivery: Arc<DeliveryService>,
    pub ingest: Arc<IngestionService>,
    pub cleanup: Arc<CleanupService>,
    pub admin_auth: Arc<dyn Authenticator>,
    pub sources_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
}

async fn require_viewer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.delivery.authorize(request.headers()).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.admin_auth.is_authenticated(request.headers()).await {
        next.run(request).await
    } else {
        DeliveryError::Unauthorized.into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let viewer = Router::new()
        .route("/video", get(video::list))
        .route("/video/", get(video::list))
        .route("/video/:id/master.m3u8", get(video::master))
        .route("/video/:id/:resolution/:file", get(video::artifact))
        .nest_service("/thumbnails", ServeDir::new(&state.thumbnails_dir))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_viewer));

    let admin = Router::new()
        .route("/admin/video", post(admin::create))
        .route("/admin/video/:id", delete(admin::delete))
        .route("/admin/video/:id/retry", post(admin::retry))
        .route("/admin/video/:id/status", get(admin::status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .layer(DefaultBodyLimit::disable());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    viewer
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
