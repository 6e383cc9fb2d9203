//! Multipart form parsing shared by the upload endpoints.

use crate::{errors::AppError, models::upload::ImageFile};
use axum::extract::Multipart;
use uuid::Uuid;

/// Fields accepted by `POST /items` and `POST /images`.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<ImageFile>,
    pub match_ids: Vec<Uuid>,
    /// Caller override of the compression capability.
    pub compress: Option<bool>,
}

pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => form.name = Some(field.text().await?),
            "description" => form.description = Some(field.text().await?),
            "image" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                form.image = Some(ImageFile::new(file_name, content_type, bytes));
            }
            "match_ids" => {
                let raw = field.text().await?;
                let id = Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::bad_request(format!("invalid match id `{}`", raw)))?;
                form.match_ids.push(id);
            }
            "compress" => {
                let raw = field.text().await?;
                let flag = raw.trim().parse::<bool>().map_err(|_| {
                    AppError::bad_request(format!("invalid compress flag `{}`", raw))
                })?;
                form.compress = Some(flag);
            }
            other => tracing::debug!("ignoring unknown form field `{}`", other),
        }
    }

    Ok(form)
}
