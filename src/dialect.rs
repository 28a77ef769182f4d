//! # SQL Dialect Module
//!
//! The `Dialect` trait keeps every SQL string of the journal store in one place so the
//! store and the query builders stay free of database-specific syntax. The dialect in
//! use is picked at compile time by feature flag; with the `sqlite` feature,
//! `CurrentDialect` is `sqlite::SqliteDialect`.
//!
//! Statements that take a generated condition (`query_post_statement`,
//! `count_post_statement`, `query_tag_statement`) expect the fragment produced by the
//! `query` module, including its leading `WHERE` when there is one.

#[cfg(feature = "sqlite")]
mod sqlite;

/// The current SQL dialect used at compile time, determined by feature flags.
#[cfg(feature = "sqlite")]
pub type CurrentDialect = sqlite::SqliteDialect;

#[cfg(feature = "sqlite")]
pub type Db = sqlx::Sqlite;

#[cfg(feature = "sqlite")]
pub type CurrentRow = sqlx::sqlite::SqliteRow;

/// Database-specific SQL generation for the journal store.
pub trait Dialect {
    /// Returns the SQL placeholder syntax for the given 1-based parameter index.
    fn placeholder(idx: usize) -> String;

    /// `EXISTS` condition matching posts that carry the tag bound at `idx`.
    fn exists_tag_query(idx: usize) -> String {
        format!(
            "EXISTS (SELECT 1 FROM post_tags WHERE post_tags.post_id = posts.id AND post_tags.tag_name = {})",
            Self::placeholder(idx)
        )
    }

    /// Case-insensitive substring match on building name, location and tags.
    ///
    /// Consumes three parameters starting at `idx`, all bound to the same escaped
    /// `%term%` pattern.
    fn text_match_query(idx: usize) -> String {
        format!(
            r#"(posts.building_name LIKE {} ESCAPE '\' OR posts.location LIKE {} ESCAPE '\' OR EXISTS (SELECT 1 FROM post_tags WHERE post_tags.post_id = posts.id AND post_tags.tag_name LIKE {} ESCAPE '\'))"#,
            Self::placeholder(idx),
            Self::placeholder(idx + 1),
            Self::placeholder(idx + 2)
        )
    }

    fn category_query(idx: usize) -> String {
        format!("posts.category = {}", Self::placeholder(idx))
    }

    fn author_query(idx: usize) -> String {
        format!("posts.user_id = {}", Self::placeholder(idx))
    }

    fn visited_since_query(idx: usize) -> String {
        format!("posts.visit_date >= {}", Self::placeholder(idx))
    }

    fn visited_until_query(idx: usize) -> String {
        format!("posts.visit_date <= {}", Self::placeholder(idx))
    }

    /// Posts the viewer bound at `idx` may see: public ones and their own.
    fn visible_to_query(idx: usize) -> String {
        format!(
            "(posts.is_public = 1 OR posts.user_id = {})",
            Self::placeholder(idx)
        )
    }

    fn public_only_query() -> String {
        "posts.is_public = 1".to_string()
    }

    fn ensure_user_statement() -> String {
        format!(
            r#"INSERT INTO users (id, username, bio, created_at) VALUES ({}, {}, {}, {})
            ON CONFLICT(id) DO UPDATE SET username = excluded.username, bio = excluded.bio"#,
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
            Self::placeholder(4)
        )
    }

    fn query_user_statement() -> String {
        format!(
            "SELECT id, username, bio, created_at FROM users WHERE id = {}",
            Self::placeholder(1)
        )
    }

    fn put_setting_statement() -> String {
        format!(
            r#"INSERT INTO settings (key, value) VALUES ({}, {})
            ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
            Self::placeholder(1),
            Self::placeholder(2)
        )
    }

    fn query_setting_statement() -> String {
        format!(
            "SELECT value FROM settings WHERE key = {}",
            Self::placeholder(1)
        )
    }

    /// Inserts a post, or rewrites every editable column of an existing one.
    ///
    /// `created_at` of an existing post is never touched.
    fn upsert_post_statement() -> String {
        format!(
            r#"INSERT INTO posts
            (id, user_id, username, building_name, category, location, visit_date, note, emotion_color, is_public, created_at, updated_at)
            VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})
            ON CONFLICT(id) DO UPDATE SET
                building_name = excluded.building_name,
                category = excluded.category,
                location = excluded.location,
                visit_date = excluded.visit_date,
                note = excluded.note,
                emotion_color = excluded.emotion_color,
                is_public = excluded.is_public,
                updated_at = excluded.updated_at"#,
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
            Self::placeholder(4),
            Self::placeholder(5),
            Self::placeholder(6),
            Self::placeholder(7),
            Self::placeholder(8),
            Self::placeholder(9),
            Self::placeholder(10),
            Self::placeholder(11),
            Self::placeholder(12)
        )
    }

    fn query_post_row_statement() -> String {
        format!("SELECT * FROM posts WHERE id = {}", Self::placeholder(1))
    }

    /// Full SELECT of post ids matching the given condition, ordering and paging.
    fn query_post_statement(condition: String) -> String {
        format!("SELECT id FROM posts {}", condition)
    }

    fn count_post_statement(condition: String) -> String {
        format!("SELECT COUNT(id) FROM posts {}", condition)
    }

    fn delete_post_tags_statement() -> String {
        format!(
            "DELETE FROM post_tags WHERE post_id = {}",
            Self::placeholder(1)
        )
    }

    fn insert_post_tag_statement() -> String {
        format!(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_name, position) VALUES ({}, {}, {})",
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3)
        )
    }

    fn query_tags_by_post_statement() -> String {
        format!(
            "SELECT tag_name FROM post_tags WHERE post_id = {} ORDER BY position",
            Self::placeholder(1)
        )
    }

    /// Tag names with the number of posts using them.
    fn query_tag_statement(condition: String) -> String {
        format!(
            "SELECT tag_name, COUNT(post_id) FROM post_tags {} GROUP BY tag_name ORDER BY tag_name",
            condition
        )
    }

    fn ensure_photo_statement() -> String {
        format!(
            "INSERT OR IGNORE INTO photos (hash, data_url) VALUES ({}, {})",
            Self::placeholder(1),
            Self::placeholder(2)
        )
    }

    fn query_photo_statement() -> String {
        format!(
            "SELECT data_url FROM photos WHERE hash = {}",
            Self::placeholder(1)
        )
    }

    fn delete_post_photos_statement() -> String {
        format!(
            "DELETE FROM post_photos WHERE post_id = {}",
            Self::placeholder(1)
        )
    }

    fn insert_post_photo_statement() -> String {
        format!(
            "INSERT INTO post_photos (post_id, slot, photo_hash) VALUES ({}, {}, {})",
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3)
        )
    }

    /// Photo slots of a post in slot order; absent slots come back with a NULL `data_url`.
    fn query_photos_by_post_statement() -> String {
        format!(
            r#"SELECT photos.data_url FROM post_photos
            LEFT JOIN photos ON photos.hash = post_photos.photo_hash
            WHERE post_photos.post_id = {}
            ORDER BY post_photos.slot"#,
            Self::placeholder(1)
        )
    }

    fn delete_orphan_photos_statement() -> &'static str {
        "DELETE FROM photos WHERE hash NOT IN (SELECT photo_hash FROM post_photos WHERE photo_hash IS NOT NULL)"
    }

    fn exists_like_statement() -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM likes WHERE post_id = {} AND user_id = {})",
            Self::placeholder(1),
            Self::placeholder(2)
        )
    }

    fn insert_like_statement() -> String {
        format!(
            "INSERT OR IGNORE INTO likes (post_id, user_id, created_at) VALUES ({}, {}, {})",
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3)
        )
    }

    fn delete_like_statement() -> String {
        format!(
            "DELETE FROM likes WHERE post_id = {} AND user_id = {}",
            Self::placeholder(1),
            Self::placeholder(2)
        )
    }

    fn count_likes_statement() -> String {
        format!(
            "SELECT COUNT(*) FROM likes WHERE post_id = {}",
            Self::placeholder(1)
        )
    }

    fn delete_likes_by_post_statement() -> String {
        format!("DELETE FROM likes WHERE post_id = {}", Self::placeholder(1))
    }

    fn insert_comment_statement() -> String {
        format!(
            "INSERT INTO comments (id, post_id, user_id, username, content, created_at) VALUES ({}, {}, {}, {}, {}, {})",
            Self::placeholder(1),
            Self::placeholder(2),
            Self::placeholder(3),
            Self::placeholder(4),
            Self::placeholder(5),
            Self::placeholder(6)
        )
    }

    /// Comments of a post, oldest first.
    fn query_comments_statement() -> String {
        format!(
            "SELECT * FROM comments WHERE post_id = {} ORDER BY created_at, rowid",
            Self::placeholder(1)
        )
    }

    fn count_comments_statement() -> String {
        format!(
            "SELECT COUNT(*) FROM comments WHERE post_id = {}",
            Self::placeholder(1)
        )
    }

    fn delete_comments_by_post_statement() -> String {
        format!(
            "DELETE FROM comments WHERE post_id = {}",
            Self::placeholder(1)
        )
    }

    fn delete_post_statement() -> String {
        format!("DELETE FROM posts WHERE id = {}", Self::placeholder(1))
    }

    fn count_posts_by_category_statement() -> &'static str {
        "SELECT category, COUNT(id) FROM posts GROUP BY category"
    }

    /// Creates the schema. Must be idempotent.
    async fn migration(pool: &sqlx::Pool<Db>) -> Result<(), sqlx::Error>;
}
