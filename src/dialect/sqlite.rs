use super::{Db, Dialect};

/// SQLite dialect implementation of the `Dialect` trait.
#[cfg(feature = "sqlite")]
pub struct SqliteDialect;

#[cfg(feature = "sqlite")]
impl Dialect for SqliteDialect {
    fn placeholder(_idx: usize) -> String {
        "?".to_string()
    }

    async fn migration(pool: &sqlx::Pool<Db>) -> Result<(), sqlx::Error> {
        let stmts = vec![
            r#"CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                bio TEXT NOT NULL,
                created_at TEXT NOT NULL
            );"#,
            r#"CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );"#,
            r#"CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                building_name TEXT NOT NULL,
                category TEXT NOT NULL,
                location TEXT NOT NULL,
                visit_date TEXT NOT NULL,
                note TEXT NOT NULL,
                emotion_color TEXT,
                is_public INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );"#,
            r#"CREATE TABLE IF NOT EXISTS post_tags (
                post_id TEXT NOT NULL,
                tag_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (post_id, tag_name),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );"#,
            r#"CREATE TABLE IF NOT EXISTS photos (
                hash TEXT PRIMARY KEY,
                data_url TEXT NOT NULL
            );"#,
            r#"CREATE TABLE IF NOT EXISTS post_photos (
                post_id TEXT NOT NULL,
                slot INTEGER NOT NULL,
                photo_hash TEXT,
                PRIMARY KEY (post_id, slot),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (photo_hash) REFERENCES photos(hash)
            );"#,
            r#"CREATE TABLE IF NOT EXISTS likes (
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );"#,
            r#"CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );"#,
            "CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);",
            "CREATE INDEX IF NOT EXISTS idx_post_tags_tag_name ON post_tags(tag_name);",
            "CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);",
        ];

        for stmt in stmts {
            sqlx::query(stmt).execute(pool).await?;
        }

        Ok(())
    }
}
