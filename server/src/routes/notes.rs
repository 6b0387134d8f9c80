//! Note endpoint routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use notesync_engine::Record;

use crate::error::Result;
use crate::handlers::{handle_delete, handle_get, handle_list, handle_put};
use crate::AppState;

/// Create note routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notes", get(list_handler))
        .route(
            "/notes/{key}",
            get(get_handler).put(put_handler).delete(delete_handler),
        )
}

/// GET /notes - All notes, ordered by key.
async fn list_handler(State(state): State<AppState>) -> Result<Json<Vec<Record>>> {
    let notes = handle_list(state.notes.as_ref()).await?;
    Ok(Json(notes))
}

/// GET /notes/{key} - One note.
async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Record>> {
    let note = handle_get(state.notes.as_ref(), &key).await?;
    Ok(Json(note))
}

/// PUT /notes/{key} - Store a note unless a newer one exists.
async fn put_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(record): Json<Record>,
) -> Result<Json<Record>> {
    let stored = handle_put(state.notes.as_ref(), &key, record).await?;
    Ok(Json(stored))
}

/// DELETE /notes/{key} - Remove a note.
async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    handle_delete(state.notes.as_ref(), &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
