use crate::{AppState, app_error_status, error_response};
use archlog::prelude::*;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CreateUser {
    username: String,
    bio: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub bio: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        UserResponse {
            id: value.id,
            username: value.username,
            bio: value.bio,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

pub async fn create_user(
    State(app): State<AppState>,
    Json(body): Json<CreateUser>,
) -> Result<(StatusCode, Json<UserResponse>), UserError> {
    let user = register_user(&app.db, &body.username, body.bio.as_deref()).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn get_user(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, UserError> {
    let user = find_user(&app.db, &id).await?;

    Ok(Json(user.into()))
}

pub struct UserError(AppError);

impl From<AppError> for UserError {
    fn from(value: AppError) -> Self {
        UserError(value)
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = app_error_status(self.0);
        error_response(status, message)
    }
}
