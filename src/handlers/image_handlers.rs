//! HTTP handlers for image upload and download.
//! Uploads go through the ingestion pipeline; downloads stream straight from
//! the object store without buffering.

use crate::{
    errors::AppError,
    handlers::multipart::read_upload_form,
    models::{object::StoredObject, upload::UploadResult},
    services::compression::Capabilities,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use tokio_util::io::ReaderStream;

/// `POST /images` — compress and upload the `image` field.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResult>), AppError> {
    let requested_at = Utc::now();
    let form = read_upload_form(multipart).await?;
    let image = form
        .image
        .ok_or_else(|| AppError::bad_request("image is required"))?;

    let mut ctx = state.upload_context(requested_at);
    if let Some(compression) = form.compress {
        ctx = ctx.with_capabilities(Capabilities { compression });
    }

    let result = state.ingest.upload(image, &ctx).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// `GET /images/{name}` — stream a stored image.
pub async fn get_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let (meta, file) = state.images.open(&name).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_image_headers(response.headers_mut(), &meta);

    Ok(response)
}

fn set_image_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let quoted = format!("\"{}\"", meta.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    // Names are never reused, so the payload behind a URL never changes.
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    if let Ok(value) = HeaderValue::from_str(&meta.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
