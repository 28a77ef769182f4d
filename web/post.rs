use crate::{Actor, AppState, app_error_status, error_response};
use archlog::prelude::*;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct FeedParams {
    /// Search box text, e.g. `tag:hanok AND NOT category:public`.
    q: Option<String>,
    category: Option<String>,
    tag: Option<String>,
    /// Only the acting user's own posts.
    #[serde(default)]
    mine: bool,
    sort: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct PostResponse {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub building_name: String,
    pub category: &'static str,
    pub category_label: &'static str,
    pub location: String,
    pub visit_date: String,
    pub note: String,
    pub tags: Vec<String>,
    pub emotion_color: Option<String>,
    pub is_public: bool,
    /// One entry per photo slot; `null` where the photo could not be read.
    pub photo_urls: Vec<Option<String>>,
    pub cover_url: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub like_count: u64,
    pub comment_count: u64,
    /// Whether the acting user likes the post; absent for anonymous requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
}

impl PostResponse {
    fn from_post(value: Post, liked: Option<bool>) -> Self {
        let photo_urls: Vec<Option<String>> = value
            .photos
            .iter()
            .map(|photo| photo.as_ref().map(|p| format!("/photos/{}", p.hash())))
            .collect();

        PostResponse {
            id: value.id,
            user_id: value.user_id,
            username: value.username,
            building_name: value.building_name,
            category: value.category.as_str(),
            category_label: value.category.label(),
            location: value.location,
            visit_date: value.visit_date.format("%Y-%m-%d").to_string(),
            note: value.note,
            tags: value.tags,
            emotion_color: value.emotion_color,
            is_public: value.is_public,
            cover_url: photo_urls.first().cloned().flatten(),
            photo_urls,
            created_at: value.created_at.to_rfc3339(),
            updated_at: value.updated_at.map(|at| at.to_rfc3339()),
            like_count: value.like_count,
            comment_count: value.comment_count,
            liked,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct FeedResponse {
    pub posts: Vec<PostResponse>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

pub async fn get_posts(
    State(app): State<AppState>,
    actor: Option<Actor>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedResponse>, PostError> {
    let viewer = actor.map(|Actor(user)| user);

    let mut extra = vec![];
    if let Some(category) = params.category.filter(|c| !c.trim().is_empty()) {
        let category = category
            .parse::<Category>()
            .map_err(|e| PostError::BadRequest(e.to_string()))?;
        extra.push(PostQueryExpr::Category(category));
    }
    if let Some(tag) = params.tag.filter(|t| !t.trim().is_empty()) {
        extra.push(PostQueryExpr::tag(tag.trim()));
    }
    if params.mine {
        let user = viewer.as_ref().ok_or(PostError::Unauthorized)?;
        extra.push(PostQueryExpr::author(&user.id));
    }

    let order = match params.sort.as_deref() {
        Some(sort) => sort.parse::<PostOrder>().map_err(PostError::BadRequest)?,
        None => PostOrder::default(),
    };
    let (page, limit) = page_window(params.page, params.limit, app.config.page_size);

    let filter = build_filter(params.q.as_deref().unwrap_or_default(), extra)?;
    let mut query = PostQuery::new(filter).with_order(order);
    if let Some(user) = &viewer {
        query = query.with_viewer(&user.id);
    }

    let total = count_posts(&app.db, &query).await?;
    let posts = query_posts(&app.db, &query.with_page(page, limit)).await?;

    Ok(Json(FeedResponse {
        posts: posts
            .into_iter()
            .map(|post| PostResponse::from_post(post, None))
            .collect(),
        total,
        page,
        limit,
    }))
}

/// Largest feed page a client may ask for.
const MAX_PAGE_LIMIT: u32 = 100;

fn page_window(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_LIMIT);
    (page, limit)
}

pub async fn get_post(
    State(app): State<AppState>,
    actor: Option<Actor>,
    Path(id): Path<String>,
) -> Result<Json<PostResponse>, PostError> {
    let viewer = actor.map(|Actor(user)| user.id);

    let post = find_post_by_id(&app.db, &id, viewer.as_deref()).await?;
    let liked = match &viewer {
        Some(user_id) => Some(has_liked(&app.db, &id, user_id).await?),
        None => None,
    };

    Ok(Json(PostResponse::from_post(post, liked)))
}

pub async fn create_post(
    State(app): State<AppState>,
    Actor(author): Actor,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PostResponse>), PostError> {
    let cmd = PostForm::read(multipart).await?.into_command()?;
    let post = cmd.execute(&app.db, &DataUrlDecoder, &author).await?;

    Ok((StatusCode::CREATED, Json(PostResponse::from_post(post, Some(false)))))
}

/// Edits a post. Sending no photo parts keeps the current photos.
pub async fn update_post(
    State(app): State<AppState>,
    Actor(author): Actor,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<PostResponse>, PostError> {
    let cmd = PostForm::read(multipart).await?.into_command()?.editing(&id);
    let post = cmd.execute(&app.db, &DataUrlDecoder, &author).await?;
    let liked = has_liked(&app.db, &post.id, &author.id).await?;

    Ok(Json(PostResponse::from_post(post, Some(liked))))
}

pub async fn delete_post(
    State(app): State<AppState>,
    Actor(author): Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, PostError> {
    remove_post(&app.db, &id, &author).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Debug)]
pub struct LikeResponse {
    pub liked: bool,
    pub count: u64,
}

pub async fn toggle_like(
    State(app): State<AppState>,
    Actor(user): Actor,
    Path(id): Path<String>,
) -> Result<Json<LikeResponse>, PostError> {
    let state = archlog::app::toggle_like(&app.db, &id, &user).await?;

    Ok(Json(LikeResponse {
        liked: state.liked,
        count: state.count,
    }))
}

#[derive(Deserialize)]
pub struct CreateComment {
    content: String,
}

#[derive(Serialize, Debug)]
pub struct CommentResponse {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub created_at: String,
}

impl From<Comment> for CommentResponse {
    fn from(value: Comment) -> Self {
        CommentResponse {
            id: value.id,
            user_id: value.user_id,
            username: value.username,
            content: value.content,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

pub async fn get_comments(
    State(app): State<AppState>,
    actor: Option<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CommentResponse>>, PostError> {
    let viewer = actor.map(|Actor(user)| user.id);
    let comments = comments_for(&app.db, &id, viewer.as_deref()).await?;

    Ok(Json(comments.into_iter().map(CommentResponse::from).collect()))
}

pub async fn create_comment(
    State(app): State<AppState>,
    Actor(author): Actor,
    Path(id): Path<String>,
    Json(body): Json<CreateComment>,
) -> Result<(StatusCode, Json<CommentResponse>), PostError> {
    let comment = add_comment(&app.db, &id, &author, &body.content).await?;

    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// The upload form. `photo` (file) and `pasted` (data URL text) parts become photo
/// slots in the order they arrive.
#[derive(Default)]
struct PostForm {
    building_name: String,
    category: Option<String>,
    location: String,
    visit_date: Option<String>,
    note: String,
    tags: String,
    emotion_color: Option<String>,
    is_public: Option<String>,
    photos: Vec<ImageSource>,
}

impl PostForm {
    async fn read(mut multipart: Multipart) -> Result<Self, PostError> {
        let mut form = PostForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| PostError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "photo" => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| PostError::BadRequest(e.body_text()))?;
                    form.photos.push(ImageSource::bytes(bytes));
                }
                "pasted" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| PostError::BadRequest(e.body_text()))?;
                    let image = EncodedImage::parse(text.trim()).map_err(AppError::from)?;
                    form.photos.push(ImageSource::pre_encoded(image));
                }
                _ => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| PostError::BadRequest(e.body_text()))?;
                    match name.as_str() {
                        "building_name" => form.building_name = text,
                        "category" => form.category = Some(text),
                        "location" => form.location = text,
                        "visit_date" => form.visit_date = Some(text),
                        "note" => form.note = text,
                        "tags" => form.tags = text,
                        "emotion_color" => form.emotion_color = Some(text),
                        "is_public" => form.is_public = Some(text),
                        _ => {} // ignore
                    }
                }
            }
        }

        Ok(form)
    }

    fn into_command(self) -> Result<PublishPostCommand, PostError> {
        let mut cmd = PublishPostCommand::new(self.building_name)
            .with_location(self.location)
            .with_note(self.note)
            .with_tags(split_tags(&self.tags))
            .with_photos(self.photos);

        if let Some(category) = self.category.filter(|c| !c.trim().is_empty()) {
            let category = category
                .parse::<Category>()
                .map_err(|e| PostError::BadRequest(e.to_string()))?;
            cmd = cmd.with_category(category);
        }

        if let Some(date) = self.visit_date.filter(|d| !d.trim().is_empty()) {
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| PostError::BadRequest(format!("visit_date: {e}")))?;
            cmd = cmd.with_visit_date(date);
        }

        if let Some(color) = self.emotion_color.filter(|c| !c.trim().is_empty()) {
            cmd = cmd.with_emotion_color(color.trim());
        }

        if let Some(is_public) = self.is_public {
            let is_public = is_public
                .trim()
                .parse::<bool>()
                .map_err(|e| PostError::BadRequest(format!("is_public: {e}")))?;
            cmd = cmd.with_visibility(is_public);
        }

        Ok(cmd)
    }
}

pub enum PostError {
    App(AppError),
    BadRequest(String),
    Unauthorized,
}

impl From<AppError> for PostError {
    fn from(value: AppError) -> Self {
        PostError::App(value)
    }
}

impl IntoResponse for PostError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            PostError::App(app_error) => app_error_status(app_error),
            PostError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            PostError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                format!("{} header required", crate::USER_HEADER),
            ),
        };

        error_response(status, message)
    }
}
