mod photo;
mod post;
mod tag;
mod user;

use archlog::{database, prelude::*};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequestParts, OptionalFromRequestParts},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

/// Header carrying the id of the acting user.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let db = Database::with_migration(database::connect(&config.database_path()).await?).await?;

    let state = AppState {
        db: Arc::new(db),
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .route("/users", axum::routing::post(user::create_user))
        .route("/users/{id}", get(user::get_user))
        .route("/posts", get(post::get_posts).post(post::create_post))
        .route(
            "/posts/{id}",
            get(post::get_post)
                .put(post::update_post)
                .delete(post::delete_post),
        )
        .route("/posts/{id}/likes", axum::routing::post(post::toggle_like))
        .route(
            "/posts/{id}/comments",
            get(post::get_comments).post(post::create_comment),
        )
        .route("/tags", get(tag::get_tags))
        .route("/categories/stats", get(tag::get_category_stats))
        .route("/photos/{hash}", get(photo::get_photo))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// The user a request acts as, identified by the `x-user-id` header.
pub struct Actor(pub User);

impl FromRequestParts<AppState> for Actor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        <Actor as OptionalFromRequestParts<AppState>>::from_request_parts(parts, state)
            .await?
            .ok_or(AuthError::MissingUser)
    }
}

/// Anonymous when the header is absent; an unknown user id is still rejected.
impl OptionalFromRequestParts<AppState> for Actor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else {
            return Ok(None);
        };
        let id = value.to_str().map_err(|_| AuthError::UnknownUser)?;

        match find_user(&state.db, id).await {
            Ok(user) => Ok(Some(Actor(user))),
            Err(AppError::NotFound(_)) => Err(AuthError::UnknownUser),
            Err(e) => Err(AuthError::App(e)),
        }
    }
}

pub enum AuthError {
    MissingUser,
    UnknownUser,
    App(AppError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AuthError::MissingUser => (
                StatusCode::UNAUTHORIZED,
                format!("missing {USER_HEADER} header"),
            ),
            AuthError::UnknownUser => (StatusCode::UNAUTHORIZED, "unknown user".to_string()),
            AuthError::App(app_error) => app_error_status(app_error),
        };

        error_response(status, message)
    }
}

/// Maps an application error to its HTTP status and message.
pub fn app_error_status(error: AppError) -> (StatusCode, String) {
    let status = match &error {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        AppError::Validation(_) | AppError::Query(_) | AppError::Decode(_) => {
            StatusCode::BAD_REQUEST
        }
        AppError::Database(e) => {
            tracing::error!(error = %e, "database failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, error.to_string())
}

pub fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        message: String,
    }

    (status, Json(ErrorResponse { message })).into_response()
}

#[cfg(test)]
mod tests {
    use super::app_error_status;
    use archlog::{app::AppError, parser::parse_query, photo::DecodeError};
    use axum::http::StatusCode;

    #[test]
    fn test_app_error_status() {
        assert_eq!(
            StatusCode::NOT_FOUND,
            app_error_status(AppError::NotFound("post 1".to_string())).0
        );
        assert_eq!(
            StatusCode::FORBIDDEN,
            app_error_status(AppError::Forbidden("post 1".to_string())).0
        );
        assert_eq!(
            StatusCode::BAD_REQUEST,
            app_error_status(AppError::Validation("empty".to_string())).0
        );
        assert_eq!(
            StatusCode::BAD_REQUEST,
            app_error_status(AppError::Decode(DecodeError::MalformedDataUrl)).0
        );

        let parse_error = parse_query("date >= soon").unwrap_err();
        let (status, message) = app_error_status(AppError::Query(parse_error));
        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert!(message.starts_with("invalid search"));
    }
}
