//! HTTP handlers for clothing items.
//!
//! `POST /items` runs the whole add-item flow: upload the image, persist the
//! item with the returned reference, then link the chosen matches. A failed
//! step undoes the ones before it.

use crate::{
    errors::AppError,
    handlers::multipart::read_upload_form,
    models::item::{ClothingItem, ClothingItemInput, ClothingItemPatch},
    services::{
        catalog::{ItemPage, ListItemsParams},
        compression::Capabilities,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Query params accepted by `GET /items`.
#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    /// Search term; when present, pagination is ignored.
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemListResponse {
    pub items: Vec<ClothingItem>,
    pub next_cursor: Option<String>,
}

impl From<ItemPage> for ItemListResponse {
    fn from(page: ItemPage) -> Self {
        Self {
            items: page.items,
            next_cursor: page.next_cursor,
        }
    }
}

/// `GET /items` — newest first, or search with `?q=`.
pub async fn list_items(
    State(state): State<AppState>,
    Query(q): Query<ListItemsQuery>,
) -> Result<Json<ItemListResponse>, AppError> {
    if let Some(term) = q.q.as_deref().filter(|t| !t.trim().is_empty()) {
        let items = state.catalog.search_items(term).await?;
        return Ok(Json(ItemListResponse {
            items,
            next_cursor: None,
        }));
    }

    let page = state
        .catalog
        .list_items(ListItemsParams {
            limit: q.limit,
            cursor: q.cursor,
        })
        .await?;
    Ok(Json(page.into()))
}

/// `POST /items` — multipart `name`, `description`, `image`, `match_ids`.
pub async fn create_item(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ClothingItem>), AppError> {
    let requested_at = Utc::now();
    let form = read_upload_form(multipart).await?;

    let name = form
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("name is required"))?;
    let image = form
        .image
        .ok_or_else(|| AppError::bad_request("image is required"))?;

    let mut ctx = state.upload_context(requested_at);
    if let Some(compression) = form.compress {
        ctx = ctx.with_capabilities(Capabilities { compression });
    }
    let uploaded = state.ingest.upload(image, &ctx).await?;

    let input = ClothingItemInput {
        name,
        description: form.description,
        image_url: uploaded.url,
        image_path: uploaded.path.clone(),
    };
    let item = match state.catalog.add_item(input).await {
        Ok(item) => item,
        Err(err) => {
            remove_image(&state, &uploaded.path).await;
            return Err(err.into());
        }
    };

    if !form.match_ids.is_empty() {
        if let Err(err) = state.matches.set_matches(item.id, &form.match_ids).await {
            if let Err(cleanup) = state.catalog.delete_item(item.id).await {
                warn!("could not roll back item {} after failed linking: {}", item.id, cleanup);
            }
            remove_image(&state, &uploaded.path).await;
            return Err(err.into());
        }
    }

    info!(id = %item.id, name = %item.name, "created item");
    Ok((StatusCode::CREATED, Json(item)))
}

/// `GET /items/{id}`
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClothingItem>, AppError> {
    Ok(Json(state.catalog.get_item(id).await?))
}

/// `PATCH /items/{id}` — JSON body of optional fields. Swapping
/// `image_path` removes the previous image.
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ClothingItemPatch>,
) -> Result<Json<ClothingItem>, AppError> {
    let update = state.catalog.update_item(id, patch).await?;
    if let Some(old) = &update.replaced_image {
        remove_image(&state, old).await;
    }
    Ok(Json(update.item))
}

/// `DELETE /items/{id}` — remove the item, its matches, and its image.
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let item = state.catalog.delete_item(id).await?;
    remove_image(&state, &item.image_path).await;

    info!(%id, "deleted item");
    Ok(StatusCode::NO_CONTENT)
}

/// Best-effort image removal; the item rows are authoritative.
async fn remove_image(state: &AppState, path: &str) {
    if let Err(err) = state.ingest.delete_image(path).await {
        warn!("could not remove image {}: {}", path, err);
    }
}
