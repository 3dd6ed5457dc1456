//! HTTP API for GitOps requests.

mod error;
mod handlers;
mod token;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::services::Workspace;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<Workspace>,
}

pub fn create_router(workspace: Arc<Workspace>) -> Router {
    let state = AppState { workspace };

    Router::new()
        .route("/_delete/{namespace}/{name}", post(handlers::delete))
        .route("/_delete/{namespace}/{name}/{token}", post(handlers::delete))
        .route("/_get/{namespace}/{name}", get(handlers::get_object))
        .route("/_get/{namespace}/{name}/{token}", get(handlers::get_object))
        .route("/{namespace}/{name}", post(handlers::apply))
        .route("/{namespace}/{name}/{token}", post(handlers::apply))
        .with_state(state)
}
