//! Persona listing.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use personachat_chat::PersonaSummary;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/personas", get(list_personas))
}

async fn list_personas(State(state): State<Arc<AppState>>) -> Json<Vec<PersonaSummary>> {
    Json(state.chat.personas())
}
