use crate::{AppState, app_error_status, error_response};
use archlog::prelude::*;
use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

/// Serves a stored photo as its original bytes.
pub async fn get_photo(
    State(app): State<AppState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, PhotoError> {
    let hash = PhotoHash::try_from(hash.as_str())
        .map_err(|e| PhotoError::BadRequest(e.to_string()))?;

    let photo = find_photo(&app.db, &hash).await?;
    let mime = photo
        .mime_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = photo.to_bytes().map_err(AppError::from)?;

    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
        ],
        bytes,
    ))
}

pub enum PhotoError {
    App(AppError),
    BadRequest(String),
}

impl From<AppError> for PhotoError {
    fn from(value: AppError) -> Self {
        PhotoError::App(value)
    }
}

impl IntoResponse for PhotoError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            PhotoError::App(AppError::Decode(e)) => {
                // stored photos are validated on the way in
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            PhotoError::App(app_error) => app_error_status(app_error),
            PhotoError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };

        error_response(status, message)
    }
}
