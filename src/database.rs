use crate::{
    dialect::{CurrentDialect, CurrentRow, Dialect},
    model::{Category, Comment, LikeState, Post, TagCount, User},
    photo::{EncodedImage, PhotoHash},
    query::{PostQuery, TagQuery},
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
pub use sqlx::Pool;
use sqlx::{FromRow, Row};
use std::{path::Path, str::FromStr};
use thiserror::Error;

pub use crate::dialect::Db;

const VISIT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Opens (creating if needed) the journal database file.
#[cfg(feature = "sqlite")]
pub async fn connect(path: &Path) -> Result<Pool<Db>, sqlx::Error> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(options)
        .await
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort lexically.
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

impl FromRow<'_, CurrentRow> for User {
    fn from_row(row: &CurrentRow) -> Result<Self, sqlx::Error> {
        let created_at: String = row.try_get("created_at")?;

        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            bio: row.try_get("bio")?,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    }
}

impl FromRow<'_, CurrentRow> for Comment {
    fn from_row(row: &CurrentRow) -> Result<Self, sqlx::Error> {
        let created_at: String = row.try_get("created_at")?;

        Ok(Comment {
            id: row.try_get("id")?,
            post_id: row.try_get("post_id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            content: row.try_get("content")?,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    }
}

/// The `posts` row alone; tags, photos and counters live in other tables.
impl FromRow<'_, CurrentRow> for Post {
    fn from_row(row: &CurrentRow) -> Result<Self, sqlx::Error> {
        let category: String = row.try_get("category")?;
        let category = Category::from_str(&category).map_err(|e| sqlx::Error::ColumnDecode {
            index: "category".to_string(),
            source: Box::new(e),
        })?;

        let visit_date: String = row.try_get("visit_date")?;
        let visit_date = NaiveDate::parse_from_str(&visit_date, VISIT_DATE_FORMAT).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "visit_date".to_string(),
                source: Box::new(e),
            }
        })?;

        let created_at: String = row.try_get("created_at")?;
        let updated_at: Option<String> = row.try_get("updated_at")?;

        Ok(Post {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            building_name: row.try_get("building_name")?,
            category,
            location: row.try_get("location")?,
            visit_date,
            note: row.try_get("note")?,
            tags: Vec::new(),
            emotion_color: row.try_get("emotion_color")?,
            is_public: row.try_get("is_public")?,
            photos: Vec::new(),
            created_at: parse_timestamp("created_at", &created_at)?,
            updated_at: updated_at
                .map(|at| parse_timestamp("updated_at", &at))
                .transpose()?,
            like_count: 0,
            comment_count: 0,
        })
    }
}

/// The journal store.
///
/// Wraps an SQLx connection pool and exposes one method per persistent operation of
/// the journal. Multi-statement writes run in a transaction. SQL syntax is delegated
/// to `Dialect`.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Db>,
}

impl Database {
    pub async fn with_migration(pool: sqlx::Pool<Db>) -> Result<Self, sqlx::Error> {
        CurrentDialect::migration(&pool).await?;

        Ok(Self { pool })
    }

    async fn retry<F, Fut, T>(&self, mut op: F) -> Result<T, DatabaseError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, DatabaseError>>,
    {
        let max_retries = 3;
        for attempt in 0..max_retries {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt + 1 < max_retries => {
                    tracing::warn!(attempt, error = %e, "retrying database operation");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("Retry loop should return before exceeding max_retries")
    }

    /// Inserts the user, or updates name and bio of an existing one.
    pub async fn put_user(&self, user: &User) -> Result<(), DatabaseError> {
        let stmt = CurrentDialect::ensure_user_statement();
        let created_at = format_timestamp(&user.created_at);

        self.retry(|| async {
            sqlx::query(&stmt)
                .bind(&user.id)
                .bind(&user.username)
                .bind(&user.bio)
                .bind(&created_at)
                .execute(&self.pool)
                .await
                .map_err(query_failed(
                    DbOperation::UpsertUser {
                        id: user.id.clone(),
                    },
                    &stmt,
                ))
        })
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let stmt = CurrentDialect::query_user_statement();

        self.retry(|| async {
            sqlx::query_as(&stmt)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_failed(
                    DbOperation::QueryUser { id: id.to_string() },
                    &stmt,
                ))
        })
        .await
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let stmt = CurrentDialect::put_setting_statement();

        self.retry(|| async {
            sqlx::query(&stmt)
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await
                .map_err(query_failed(
                    DbOperation::PutSetting {
                        key: key.to_string(),
                    },
                    &stmt,
                ))
        })
        .await?;

        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let stmt = CurrentDialect::query_setting_statement();

        self.retry(|| async {
            sqlx::query_scalar(&stmt)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_failed(
                    DbOperation::QuerySetting {
                        key: key.to_string(),
                    },
                    &stmt,
                ))
        })
        .await
    }

    /// Writes a post with its tags and photo slots.
    ///
    /// This is a transactional operation that:
    /// 1. Inserts the post row, or updates the editable columns of an existing one
    /// 2. Replaces the post's tags, keeping their order
    /// 3. Stores every present photo once, keyed by its hash
    /// 4. Replaces the post's photo slots; an absent photo keeps its slot as NULL
    /// 5. Drops photos an edit left unreferenced
    ///
    /// Counters on `post` are ignored.
    pub async fn save_post(&self, post: &Post) -> Result<(), DatabaseError> {
        let upsert_post = CurrentDialect::upsert_post_statement();
        let delete_tags = CurrentDialect::delete_post_tags_statement();
        let insert_tag = CurrentDialect::insert_post_tag_statement();
        let ensure_photo = CurrentDialect::ensure_photo_statement();
        let delete_slots = CurrentDialect::delete_post_photos_statement();
        let insert_slot = CurrentDialect::insert_post_photo_statement();
        let delete_orphans = CurrentDialect::delete_orphan_photos_statement();

        let visit_date = post.visit_date.format(VISIT_DATE_FORMAT).to_string();
        let created_at = format_timestamp(&post.created_at);
        let updated_at = post.updated_at.as_ref().map(format_timestamp);
        let photos: Vec<Option<(String, &str)>> = post
            .photos
            .iter()
            .map(|photo| {
                photo
                    .as_ref()
                    .map(|photo| (photo.hash().to_string(), photo.as_str()))
            })
            .collect();

        let operation = || DbOperation::SavePost {
            id: post.id.clone(),
        };

        self.retry(|| async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| DatabaseError::TransactionFailed { source: e })?;

            sqlx::query(&upsert_post)
                .bind(&post.id)
                .bind(&post.user_id)
                .bind(&post.username)
                .bind(&post.building_name)
                .bind(post.category.as_str())
                .bind(&post.location)
                .bind(&visit_date)
                .bind(&post.note)
                .bind(&post.emotion_color)
                .bind(post.is_public)
                .bind(&created_at)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await
                .map_err(query_failed(operation(), &upsert_post))?;

            sqlx::query(&delete_tags)
                .bind(&post.id)
                .execute(&mut *tx)
                .await
                .map_err(query_failed(operation(), &delete_tags))?;

            for (position, tag) in post.tags.iter().enumerate() {
                sqlx::query(&insert_tag)
                    .bind(&post.id)
                    .bind(tag)
                    .bind(position as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(query_failed(operation(), &insert_tag))?;
            }

            sqlx::query(&delete_slots)
                .bind(&post.id)
                .execute(&mut *tx)
                .await
                .map_err(query_failed(operation(), &delete_slots))?;

            for (slot, photo) in photos.iter().enumerate() {
                if let Some((hash, data_url)) = photo {
                    sqlx::query(&ensure_photo)
                        .bind(hash)
                        .bind(*data_url)
                        .execute(&mut *tx)
                        .await
                        .map_err(query_failed(operation(), &ensure_photo))?;
                }

                sqlx::query(&insert_slot)
                    .bind(&post.id)
                    .bind(slot as i64)
                    .bind(photo.as_ref().map(|(hash, _)| hash))
                    .execute(&mut *tx)
                    .await
                    .map_err(query_failed(operation(), &insert_slot))?;
            }

            sqlx::query(delete_orphans)
                .execute(&mut *tx)
                .await
                .map_err(query_failed(operation(), delete_orphans))?;

            tx.commit()
                .await
                .map_err(|e| DatabaseError::TransactionFailed { source: e })
        })
        .await?;

        Ok(())
    }

    /// Loads a post with its tags, photo slots and counters.
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, DatabaseError> {
        let stmt = CurrentDialect::query_post_row_statement();

        let post: Option<Post> = self
            .retry(|| async {
                sqlx::query_as(&stmt)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(query_failed(
                        DbOperation::QueryPost { id: id.to_string() },
                        &stmt,
                    ))
            })
            .await?;

        let Some(mut post) = post else {
            return Ok(None);
        };

        post.tags = self.get_tags(id).await?;
        post.photos = self.get_photos(id).await?;
        post.like_count = self.count_likes(id).await?;
        post.comment_count = self.count_comments(id).await?;

        Ok(Some(post))
    }

    /// Returns the tags of a post in the order they were written.
    pub async fn get_tags(&self, post_id: &str) -> Result<Vec<String>, DatabaseError> {
        let stmt = CurrentDialect::query_tags_by_post_statement();

        self.retry(|| async {
            sqlx::query_scalar(&stmt)
                .bind(post_id)
                .fetch_all(&self.pool)
                .await
                .map_err(query_failed(
                    DbOperation::QueryPost {
                        id: post_id.to_string(),
                    },
                    &stmt,
                ))
        })
        .await
    }

    /// Returns the photo slots of a post in slot order.
    pub async fn get_photos(
        &self,
        post_id: &str,
    ) -> Result<Vec<Option<EncodedImage>>, DatabaseError> {
        let stmt = CurrentDialect::query_photos_by_post_statement();

        let slots: Vec<Option<String>> = self
            .retry(|| async {
                sqlx::query_scalar(&stmt)
                    .bind(post_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(query_failed(
                        DbOperation::QueryPost {
                            id: post_id.to_string(),
                        },
                        &stmt,
                    ))
            })
            .await?;

        Ok(slots
            .into_iter()
            .map(|slot| slot.map(EncodedImage::from))
            .collect())
    }

    pub async fn get_photo(&self, hash: &PhotoHash) -> Result<Option<EncodedImage>, DatabaseError> {
        let stmt = CurrentDialect::query_photo_statement();

        let data_url: Option<String> = self
            .retry(|| async {
                sqlx::query_scalar(&stmt)
                    .bind(hash.to_string())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(query_failed(
                        DbOperation::QueryPhoto { hash: hash.clone() },
                        &stmt,
                    ))
            })
            .await?;

        Ok(data_url.map(EncodedImage::from))
    }

    /// Performs a feed query.
    ///
    /// Returns the ids of matching posts in the query's order.
    pub async fn query_posts(&self, query: &PostQuery) -> Result<Vec<String>, DatabaseError> {
        let (sql, params) = query.to_sql();
        let stmt = CurrentDialect::query_post_statement(sql);

        self.retry(|| async {
            let mut q = sqlx::query_scalar::<_, String>(&stmt);

            for param in &params {
                q = q.bind(param);
            }

            q.fetch_all(&self.pool)
                .await
                .map_err(query_failed(DbOperation::QueryPosts, &stmt))
        })
        .await
    }

    /// Counts the posts a query matches, ignoring its pagination.
    pub async fn count_posts(&self, query: &PostQuery) -> Result<u64, DatabaseError> {
        let (sql, params) = query.condition_sql();
        let stmt = CurrentDialect::count_post_statement(sql);

        let count = self
            .retry(|| async {
                let mut q = sqlx::query_scalar::<_, i64>(&stmt);

                for param in &params {
                    q = q.bind(param);
                }

                q.fetch_one(&self.pool)
                    .await
                    .map_err(query_failed(DbOperation::QueryPosts, &stmt))
            })
            .await?;

        Ok(count as u64)
    }

    /// Removes a post and everything hanging off it.
    ///
    /// This is a transactional operation that:
    /// 1. Deletes the post's likes, comments, tags and photo slots
    /// 2. Deletes the post row
    /// 3. Deletes photos no longer referenced by any post
    ///
    /// Returns `false` if there was no such post.
    pub async fn remove_post(&self, id: &str) -> Result<bool, DatabaseError> {
        let dependents = [
            CurrentDialect::delete_likes_by_post_statement(),
            CurrentDialect::delete_comments_by_post_statement(),
            CurrentDialect::delete_post_tags_statement(),
            CurrentDialect::delete_post_photos_statement(),
        ];
        let delete_post = CurrentDialect::delete_post_statement();
        let delete_orphans = CurrentDialect::delete_orphan_photos_statement();

        let operation = || DbOperation::RemovePost { id: id.to_string() };

        self.retry(|| async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| DatabaseError::TransactionFailed { source: e })?;

            for stmt in &dependents {
                sqlx::query(stmt)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(query_failed(operation(), stmt))?;
            }

            let removed = sqlx::query(&delete_post)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(query_failed(operation(), &delete_post))?
                .rows_affected();

            sqlx::query(delete_orphans)
                .execute(&mut *tx)
                .await
                .map_err(query_failed(operation(), delete_orphans))?;

            tx.commit()
                .await
                .map_err(|e| DatabaseError::TransactionFailed { source: e })?;

            Ok(removed > 0)
        })
        .await
    }

    /// Likes the post for the user, or takes the like back if it was already there.
    pub async fn toggle_like(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> Result<LikeState, DatabaseError> {
        let exists_like = CurrentDialect::exists_like_statement();
        let insert_like = CurrentDialect::insert_like_statement();
        let delete_like = CurrentDialect::delete_like_statement();
        let count_likes = CurrentDialect::count_likes_statement();

        let operation = || DbOperation::ToggleLike {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
        };

        self.retry(|| async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| DatabaseError::TransactionFailed { source: e })?;

            let existed: i64 = sqlx::query_scalar(&exists_like)
                .bind(post_id)
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(query_failed(operation(), &exists_like))?;

            let liked = if existed != 0 {
                sqlx::query(&delete_like)
                    .bind(post_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(query_failed(operation(), &delete_like))?;
                false
            } else {
                sqlx::query(&insert_like)
                    .bind(post_id)
                    .bind(user_id)
                    .bind(format_timestamp(&Utc::now()))
                    .execute(&mut *tx)
                    .await
                    .map_err(query_failed(operation(), &insert_like))?;
                true
            };

            let count: i64 = sqlx::query_scalar(&count_likes)
                .bind(post_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(query_failed(operation(), &count_likes))?;

            tx.commit()
                .await
                .map_err(|e| DatabaseError::TransactionFailed { source: e })?;

            Ok(LikeState {
                liked,
                count: count as u64,
            })
        })
        .await
    }

    pub async fn has_liked(&self, post_id: &str, user_id: &str) -> Result<bool, DatabaseError> {
        let stmt = CurrentDialect::exists_like_statement();

        let existed: i64 = self
            .retry(|| async {
                sqlx::query_scalar(&stmt)
                    .bind(post_id)
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(query_failed(
                        DbOperation::QueryLikes {
                            post_id: post_id.to_string(),
                        },
                        &stmt,
                    ))
            })
            .await?;

        Ok(existed != 0)
    }

    pub async fn count_likes(&self, post_id: &str) -> Result<u64, DatabaseError> {
        let stmt = CurrentDialect::count_likes_statement();

        let count: i64 = self
            .retry(|| async {
                sqlx::query_scalar(&stmt)
                    .bind(post_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(query_failed(
                        DbOperation::QueryLikes {
                            post_id: post_id.to_string(),
                        },
                        &stmt,
                    ))
            })
            .await?;

        Ok(count as u64)
    }

    pub async fn add_comment(&self, comment: &Comment) -> Result<(), DatabaseError> {
        let stmt = CurrentDialect::insert_comment_statement();
        let created_at = format_timestamp(&comment.created_at);

        self.retry(|| async {
            sqlx::query(&stmt)
                .bind(&comment.id)
                .bind(&comment.post_id)
                .bind(&comment.user_id)
                .bind(&comment.username)
                .bind(&comment.content)
                .bind(&created_at)
                .execute(&self.pool)
                .await
                .map_err(query_failed(
                    DbOperation::InsertComment {
                        post_id: comment.post_id.clone(),
                    },
                    &stmt,
                ))
        })
        .await?;

        Ok(())
    }

    /// Returns the comments of a post, oldest first.
    pub async fn get_comments(&self, post_id: &str) -> Result<Vec<Comment>, DatabaseError> {
        let stmt = CurrentDialect::query_comments_statement();

        self.retry(|| async {
            sqlx::query_as(&stmt)
                .bind(post_id)
                .fetch_all(&self.pool)
                .await
                .map_err(query_failed(
                    DbOperation::QueryComments {
                        post_id: post_id.to_string(),
                    },
                    &stmt,
                ))
        })
        .await
    }

    pub async fn count_comments(&self, post_id: &str) -> Result<u64, DatabaseError> {
        let stmt = CurrentDialect::count_comments_statement();

        let count: i64 = self
            .retry(|| async {
                sqlx::query_scalar(&stmt)
                    .bind(post_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(query_failed(
                        DbOperation::QueryComments {
                            post_id: post_id.to_string(),
                        },
                        &stmt,
                    ))
            })
            .await?;

        Ok(count as u64)
    }

    /// Lists tags in use with the number of posts carrying each, sorted by name.
    pub async fn query_tags(&self, query: &TagQuery) -> Result<Vec<TagCount>, DatabaseError> {
        let (condition, limit, params) = query.to_sql();
        let stmt = CurrentDialect::query_tag_statement(condition) + &limit;

        let rows = self
            .retry(|| async {
                let mut q = sqlx::query_as::<_, (String, i64)>(&stmt);

                for param in &params {
                    q = q.bind(param);
                }

                q.fetch_all(&self.pool)
                    .await
                    .map_err(query_failed(DbOperation::QueryTags, &stmt))
            })
            .await?
            .into_iter()
            .map(|(name, count)| TagCount {
                name,
                post_count: count as u64,
            })
            .collect();

        Ok(rows)
    }

    /// Number of posts per category. Categories without posts are missing.
    pub async fn count_posts_by_category(&self) -> Result<Vec<(Category, u64)>, DatabaseError> {
        let stmt = CurrentDialect::count_posts_by_category_statement();

        let counts = self
            .retry(|| async {
                sqlx::query_as::<_, (String, i64)>(stmt)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(query_failed(DbOperation::CountByCategory, stmt))
            })
            .await?
            .into_iter()
            .filter_map(|(category, count)| {
                Category::from_str(&category)
                    .map(|category| (category, count as u64))
                    .map_err(|e| tracing::warn!(error = %e, "skipping stored category"))
                    .ok()
            })
            .collect();

        Ok(counts)
    }
}

fn query_failed(operation: DbOperation, sql: &str) -> impl FnOnce(sqlx::Error) -> DatabaseError {
    let sql = sql.to_string();
    move |source| DatabaseError::QueryFailed {
        operation,
        sql,
        source,
    }
}

/// Represents errors that can occur during database operations.
///
/// Each variant includes contextual information to assist with debugging and error handling.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A general SQL query failure, with the operation and the SQL that failed.
    #[error("Query failed during {operation:?}: sql={sql}")]
    QueryFailed {
        operation: DbOperation,
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    /// A failure to begin or commit a transaction.
    #[error("Failed to operate transaction")]
    TransactionFailed {
        #[source]
        source: sqlx::Error,
    },
}

/// The journal operation being performed, attached to [`DatabaseError::QueryFailed`].
#[derive(Debug, Clone)]
pub enum DbOperation {
    UpsertUser { id: String },
    QueryUser { id: String },
    PutSetting { key: String },
    QuerySetting { key: String },
    /// Post row, tags and photo slots written together.
    SavePost { id: String },
    QueryPost { id: String },
    /// Feed query or count with dynamic conditions.
    QueryPosts,
    RemovePost { id: String },
    QueryPhoto { hash: PhotoHash },
    ToggleLike { post_id: String, user_id: String },
    QueryLikes { post_id: String },
    InsertComment { post_id: String },
    QueryComments { post_id: String },
    QueryTags,
    CountByCategory,
}

impl DatabaseError {
    fn is_retryable(&self) -> bool {
        let is_retryable_kind = |e: &sqlx::Error| {
            matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::Protocol(_) | sqlx::Error::PoolTimedOut
            )
        };

        match self {
            DatabaseError::QueryFailed { source, .. } => is_retryable_kind(source),
            DatabaseError::TransactionFailed { source } => is_retryable_kind(source),
        }
    }
}
