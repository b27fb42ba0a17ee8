pub mod catalog;
pub mod portfolio;
pub mod trading;
pub mod yields;

use axum::{extract::Multipart, http::StatusCode, Json};

use crate::errors::Result;
use crate::import::FileUpload;
use crate::models::MessageResponse;

pub async fn health() -> (StatusCode, Json<MessageResponse>) {
    (StatusCode::OK, Json(MessageResponse::new("ok")))
}

/// Pull the `file` part out of a multipart form, if the client sent one.
pub async fn read_upload(mut multipart: Multipart) -> Result<Option<FileUpload>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Some(FileUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}
