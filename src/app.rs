//! # Journal Application Module
//!
//! The operations of the architecture journal, composed from the [`Database`] store
//! and the photo batch reader in [`crate::ingest`]. Both front-ends (CLI and web)
//! call into this module only.
//!
//! ## Provided Structures
//!
//! - **PublishPostCommand**: builds a new post or an edit of an existing one,
//!   settles its photo batch and persists the result.
//!
//! ## Core Asynchronous Functions
//!
//! - **register_user**, **current_user**, **find_user**: the local author identity.
//! - **remove_post**, **find_post_by_id**, **query_posts**, **count_posts**: posts and
//!   the feed. Private posts are only ever visible to their author.
//! - **toggle_like**, **has_liked**, **add_comment**, **comments_for**: reactions.
//! - **query_tags**, **category_stats**, **find_photo**: browsing aids.
//!
//! ## Error Handling
//!
//! Every operation returns [`AppError`]. Photos that fail to decode are never an
//! error: their slot stays empty and the post is still published.

use crate::{
    database::{Database, DatabaseError},
    ingest::{Decode, ImageBatch, ImageSource},
    model::{
        Category, CategoryStats, Comment, DEFAULT_BIO, LikeState, Post, TagCount, User,
        normalize_tags,
    },
    parser::{ParseErrorDetail, parse_filter},
    photo::{DecodeError, EncodedImage, PhotoHash},
    query::{PostQuery, PostQueryExpr, PostQueryKind, TagQuery},
};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Settings key remembering the local author.
pub const CURRENT_USER_KEY: &str = "current_user";

/// Creates a user and makes it the current user of this journal.
pub async fn register_user(
    db: &Database,
    username: &str,
    bio: Option<&str>,
) -> Result<User, AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::Validation("username must not be empty".to_string()));
    }

    let bio = bio
        .map(str::trim)
        .filter(|bio| !bio.is_empty())
        .unwrap_or(DEFAULT_BIO);

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        bio: bio.to_string(),
        created_at: Utc::now(),
    };

    db.put_user(&user).await?;
    db.put_setting(CURRENT_USER_KEY, &user.id).await?;

    tracing::info!(user_id = %user.id, username = %user.username, "registered user");

    Ok(user)
}

/// The user last registered on this journal, if any.
pub async fn current_user(db: &Database) -> Result<Option<User>, AppError> {
    let Some(id) = db.get_setting(CURRENT_USER_KEY).await? else {
        return Ok(None);
    };

    Ok(db.get_user(&id).await?)
}

pub async fn find_user(db: &Database, id: &str) -> Result<User, AppError> {
    db.get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))
}

/// Represents a request to publish a post, or to edit one.
///
/// Use the builder-style methods to fill in the post before calling `execute()`.
/// Photos are attached in order; the first one is the cover.
#[derive(Debug, Clone)]
pub struct PublishPostCommand {
    /// Post being edited. `None` publishes a new post.
    pub post_id: Option<String>,
    pub building_name: String,
    pub category: Category,
    pub location: String,
    /// Defaults to today.
    pub visit_date: Option<NaiveDate>,
    pub note: String,
    pub tags: Vec<String>,
    pub emotion_color: Option<String>,
    /// `None` publishes a new post publicly and leaves an edited post's visibility as is.
    pub is_public: Option<bool>,
    pub photos: ImageBatch,
}

impl PublishPostCommand {
    pub fn new<T: Into<String>>(building_name: T) -> Self {
        PublishPostCommand {
            post_id: None,
            building_name: building_name.into(),
            category: Category::default(),
            location: String::new(),
            visit_date: None,
            note: String::new(),
            tags: vec![],
            emotion_color: None,
            is_public: None,
            photos: ImageBatch::default(),
        }
    }

    /// Turns the command into an edit of an existing post.
    pub fn editing<T: Into<String>>(mut self, post_id: T) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_location<T: Into<String>>(mut self, location: T) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_visit_date(mut self, date: NaiveDate) -> Self {
        self.visit_date = Some(date);
        self
    }

    pub fn with_note<T: Into<String>>(mut self, note: T) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    /// Sets the mood colour, `#rrggbb`.
    pub fn with_emotion_color<T: Into<String>>(mut self, color: T) -> Self {
        self.emotion_color = Some(color.into());
        self
    }

    pub fn with_visibility(mut self, is_public: bool) -> Self {
        self.is_public = Some(is_public);
        self
    }

    pub fn with_photo(mut self, source: ImageSource) -> Self {
        self.photos.push(source);
        self
    }

    pub fn with_photos<I: IntoIterator<Item = ImageSource>>(mut self, sources: I) -> Self {
        for source in sources {
            self.photos.push(source);
        }
        self
    }

    /// Publishes the post as `author`.
    ///
    /// Photos are read through `decoder`; one that fails leaves an empty slot. When
    /// editing, only the author may edit, the creation time is kept, and submitting no
    /// photos at all keeps the photos the post already has.
    ///
    /// Returns the post as stored.
    pub async fn execute<D: Decode>(
        self,
        db: &Database,
        decoder: &D,
        author: &User,
    ) -> Result<Post, AppError> {
        let building_name = self.building_name.trim().to_string();
        if building_name.is_empty() {
            return Err(AppError::Validation(
                "building name must not be empty".to_string(),
            ));
        }

        if let Some(color) = &self.emotion_color {
            if !is_hex_color(color) {
                return Err(AppError::Validation(format!(
                    "emotion color must look like #rrggbb, got {color:?}"
                )));
            }
        }

        let existing = match &self.post_id {
            Some(id) => {
                let existing = db
                    .get_post(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("post {id}")))?;
                if existing.user_id != author.id {
                    return Err(AppError::Forbidden(format!(
                        "post {id} belongs to another user"
                    )));
                }
                Some(existing)
            }
            None => None,
        };

        let now = Utc::now();
        let keep_photos = self.photos.is_empty();
        let is_public = self
            .is_public
            .unwrap_or_else(|| existing.as_ref().is_none_or(|post| post.is_public));
        let visit_date = self.visit_date.unwrap_or_else(|| now.date_naive());

        let post = self
            .photos
            .settle_then(decoder, |photos| {
                let (id, created_at, updated_at, photos) = match existing {
                    Some(existing) => (
                        existing.id,
                        existing.created_at,
                        Some(now),
                        if keep_photos { existing.photos } else { photos },
                    ),
                    None => (Uuid::new_v4().to_string(), now, None, photos),
                };

                Post {
                    id,
                    user_id: author.id.clone(),
                    username: author.username.clone(),
                    building_name,
                    category: self.category,
                    location: self.location.trim().to_string(),
                    visit_date,
                    note: self.note,
                    tags: self.tags,
                    emotion_color: self.emotion_color,
                    is_public,
                    photos,
                    created_at,
                    updated_at,
                    like_count: 0,
                    comment_count: 0,
                }
            })
            .await;

        db.save_post(&post).await?;

        tracing::info!(
            post_id = %post.id,
            photos = post.photos.len(),
            edited = post.updated_at.is_some(),
            "published post"
        );

        find_post_by_id(db, &post.id, Some(&author.id)).await
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Deletes a post with its likes, comments and photos. Only the author may do so.
pub async fn remove_post(db: &Database, post_id: &str, actor: &User) -> Result<(), AppError> {
    let post = find_post_by_id(db, post_id, Some(&actor.id)).await?;
    if post.user_id != actor.id {
        return Err(AppError::Forbidden(format!(
            "post {post_id} belongs to another user"
        )));
    }

    db.remove_post(post_id).await?;

    tracing::info!(post_id, "removed post");

    Ok(())
}

/// Retrieves a post as seen by `viewer`.
///
/// A private post that does not belong to the viewer is reported as not found.
pub async fn find_post_by_id(
    db: &Database,
    post_id: &str,
    viewer: Option<&str>,
) -> Result<Post, AppError> {
    db.get_post(post_id)
        .await?
        .filter(|post| post.is_public || Some(post.user_id.as_str()) == viewer)
        .ok_or_else(|| AppError::NotFound(format!("post {post_id}")))
}

/// Runs a feed query and loads every matching post, in query order.
///
/// Posts are loaded in parallel.
pub async fn query_posts(db: &Database, query: &PostQuery) -> Result<Vec<Post>, AppError> {
    let ids = db.query_posts(query).await?;

    let mut set = JoinSet::new();
    for id in ids.clone() {
        let db = db.clone();
        set.spawn(async move {
            let post = db.get_post(&id).await?;
            Ok::<(String, Option<Post>), AppError>((id, post))
        });
    }

    let mut map = HashMap::new();
    while let Some(result) = set.join_next().await {
        match result {
            Ok(Ok((id, Some(post)))) => {
                map.insert(id, post);
            }
            // removed between the query and the load
            Ok(Ok((_, None))) => {}
            Ok(Err(e)) => return Err(e),
            Err(join_err) => panic!("task panicked in post retrieval: {join_err}"),
        }
    }

    let posts = ids.into_iter().filter_map(|id| map.remove(&id)).collect();

    Ok(posts)
}

/// Counts the posts matching a query, ignoring pagination.
pub async fn count_posts(db: &Database, query: &PostQuery) -> Result<u64, AppError> {
    Ok(db.count_posts(query).await?)
}

/// Combines a search box string with extra filters into one feed filter.
///
/// A blank search adds nothing.
pub fn build_filter<I>(search: &str, extra: I) -> Result<PostQueryKind, AppError>
where
    I: IntoIterator<Item = PostQueryExpr>,
{
    let searched = match parse_filter(search)? {
        PostQueryKind::All => None,
        PostQueryKind::Where(expr) => Some(expr),
    };

    Ok(PostQueryKind::all_of(searched.into_iter().chain(extra)))
}

/// Likes the post for `user`, or takes the like back.
pub async fn toggle_like(db: &Database, post_id: &str, user: &User) -> Result<LikeState, AppError> {
    find_post_by_id(db, post_id, Some(&user.id)).await?;

    let state = db.toggle_like(post_id, &user.id).await?;

    tracing::debug!(post_id, user_id = %user.id, liked = state.liked, count = state.count, "toggled like");

    Ok(state)
}

pub async fn has_liked(db: &Database, post_id: &str, user_id: &str) -> Result<bool, AppError> {
    Ok(db.has_liked(post_id, user_id).await?)
}

/// Adds a comment by `author` under the post.
pub async fn add_comment(
    db: &Database,
    post_id: &str,
    author: &User,
    content: &str,
) -> Result<Comment, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("comment must not be empty".to_string()));
    }

    find_post_by_id(db, post_id, Some(&author.id)).await?;

    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        post_id: post_id.to_string(),
        user_id: author.id.clone(),
        username: author.username.clone(),
        content: content.to_string(),
        created_at: Utc::now(),
    };

    db.add_comment(&comment).await?;

    Ok(comment)
}

/// Comments under a post as seen by `viewer`, oldest first.
pub async fn comments_for(
    db: &Database,
    post_id: &str,
    viewer: Option<&str>,
) -> Result<Vec<Comment>, AppError> {
    find_post_by_id(db, post_id, viewer).await?;

    Ok(db.get_comments(post_id).await?)
}

/// Executes a tag query against the database and returns matching tags with their usage.
pub async fn query_tags(db: &Database, query: &TagQuery) -> Result<Vec<TagCount>, AppError> {
    db.query_tags(query).await.map_err(AppError::from)
}

/// Share of posts per category, over every post in the journal.
pub async fn category_stats(db: &Database) -> Result<CategoryStats, AppError> {
    let counts = db.count_posts_by_category().await?;

    Ok(CategoryStats::from_counts(counts))
}

pub async fn find_photo(db: &Database, hash: &PhotoHash) -> Result<EncodedImage, AppError> {
    db.get_photo(hash)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("photo {hash}")))
}

/// Error types within the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// A user-supplied photo could not be accepted where one was required.
    #[error("photo error: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid search: {0}")]
    Query(#[from] ParseErrorDetail),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    Validation(String),
}
