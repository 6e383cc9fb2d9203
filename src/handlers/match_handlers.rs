//! HTTP handlers for the match graph.

use crate::{
    errors::AppError,
    models::{
        graph::GraphSnapshot,
        matches::{ItemMatch, MatchingItem},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of `PUT /items/{id}/matches`.
#[derive(Debug, Deserialize)]
pub struct SetMatchesReq {
    pub match_ids: Vec<Uuid>,
}

/// `GET /items/{id}/matches`
pub async fn get_matches(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchingItem>>, AppError> {
    Ok(Json(state.matches.get_matching_items(id).await?))
}

/// `PUT /items/{id}/matches` — replace the whole set; returns the new set.
pub async fn set_matches(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetMatchesReq>,
) -> Result<Json<Vec<MatchingItem>>, AppError> {
    state.matches.set_matches(id, &req.match_ids).await?;
    Ok(Json(state.matches.get_matching_items(id).await?))
}

/// `PUT /items/{id}/matches/{other}`
pub async fn add_match(
    State(state): State<AppState>,
    Path((id, other)): Path<(Uuid, Uuid)>,
) -> Result<Json<ItemMatch>, AppError> {
    Ok(Json(state.matches.add_match(id, other).await?))
}

/// `DELETE /items/{id}/matches/{other}`
pub async fn remove_match(
    State(state): State<AppState>,
    Path((id, other)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.matches.remove_match(id, other).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /graph` — nodes and edges for a graph view.
pub async fn graph(State(state): State<AppState>) -> Result<Json<GraphSnapshot>, AppError> {
    Ok(Json(state.matches.graph().await?))
}
