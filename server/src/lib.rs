//! NoteSync Server - remote note store for NoteSync clients.
//!
//! Serves the note API that `notesync_engine::HttpRemote` polls and publishes
//! to. Every write goes through the same last-write-wins rule the engine uses.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use crate::db::{MemoryNoteRepository, NoteRepository};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<dyn NoteRepository>,
}

impl AppState {
    pub fn new(notes: Arc<dyn NoteRepository>) -> Self {
        Self { notes }
    }

    /// State backed by a fresh in-memory repository.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryNoteRepository::new()))
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
