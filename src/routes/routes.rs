//! Defines routes for the wardrobe catalog API.
//!
//! ## Structure
//! - **Items**
//!   - `GET    /items` — list newest first (`limit`, `cursor`) or search (`q`)
//!   - `POST   /items` — multipart create: upload image, save item, link matches
//!   - `GET    /items/{id}` — fetch one item
//!   - `PATCH  /items/{id}` — partial update
//!   - `DELETE /items/{id}` — delete item, its matches and its image
//!
//! - **Matches**
//!   - `GET    /items/{id}/matches` — items matched with `id`
//!   - `PUT    /items/{id}/matches` — replace the match set
//!   - `PUT    /items/{id}/matches/{other}` — link two items
//!   - `DELETE /items/{id}/matches/{other}` — unlink two items
//!   - `GET    /graph` — every item and every match edge
//!
//! - **Images**
//!   - `POST   /images` — compress and upload an image
//!   - `GET    /images/{name}` — download a stored image

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{get_image, upload_image},
        item_handlers::{create_item, delete_item, get_item, list_items, update_item},
        match_handlers::{add_match, get_matches, graph, remove_match, set_matches},
    },
    services::ingest::MAX_UPLOAD_BYTES,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build the router for every endpoint, carrying `AppState` to the handlers.
///
/// Request bodies may be up to twice the image limit; the ingest pipeline
/// rejects oversized images itself.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/items/{id}/matches", get(get_matches).put(set_matches))
        .route(
            "/items/{id}/matches/{other}",
            put(add_match).delete(remove_match),
        )
        .route("/graph", get(graph))
        .route("/images", post(upload_image))
        .route("/images/{name}", get(get_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * 2))
}
