use crate::{AppState, app_error_status, error_response};
use archlog::prelude::*;
use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct TagParams {
    prefix: Option<String>,
    /// Comma separated names to match exactly.
    names: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct TagResponse {
    pub name: String,
    pub post_count: u64,
}

pub async fn get_tags(
    State(app): State<AppState>,
    Query(params): Query<TagParams>,
) -> Result<Json<Vec<TagResponse>>, TagError> {
    let exact = split_tags(&params.names.unwrap_or_default())
        .into_iter()
        .map(TagQueryExpr::Exact);
    let prefix = params
        .prefix
        .filter(|p| !p.trim().is_empty())
        .map(TagQueryExpr::Prefix);

    let query = TagQuery::new(
        exact
            .chain(prefix)
            .reduce(TagQueryExpr::or)
            .map(TagQueryKind::Where)
            .unwrap_or(TagQueryKind::All),
    )
    .with_limit(params.limit.unwrap_or(app.config.page_size));

    let tags = query_tags(&app.db, &query).await?;

    Ok(Json(
        tags.into_iter()
            .map(|tag| TagResponse {
                name: tag.name,
                post_count: tag.post_count,
            })
            .collect(),
    ))
}

#[derive(Serialize, Debug)]
pub struct CategoryStatResponse {
    pub category: &'static str,
    pub label: &'static str,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Serialize, Debug)]
pub struct CategoryStatsResponse {
    pub total: u64,
    pub categories: Vec<CategoryStatResponse>,
}

pub async fn get_category_stats(
    State(app): State<AppState>,
) -> Result<Json<CategoryStatsResponse>, TagError> {
    let stats = category_stats(&app.db).await?;

    Ok(Json(CategoryStatsResponse {
        total: stats.total,
        categories: stats
            .entries
            .into_iter()
            .map(|entry| CategoryStatResponse {
                category: entry.category.as_str(),
                label: entry.category.label(),
                count: entry.count,
                percentage: entry.percentage,
            })
            .collect(),
    }))
}

pub enum TagError {
    App(AppError),
}

impl From<AppError> for TagError {
    fn from(value: AppError) -> Self {
        TagError::App(value)
    }
}

impl IntoResponse for TagError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            TagError::App(app_error) => app_error_status(app_error),
        };

        error_response(status, message)
    }
}
