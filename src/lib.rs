//! # Architecture Journal
//!
//! This crate keeps a local journal of building visits: posts with photos, tags, a
//! category, a visit date and a mood colour, plus likes and comments. It backs both
//! the `cli` and the `web` binaries.
//!
//! ## Features
//!
//! - **Photo batches**: a post's photos come from files, uploaded bytes, or pasted
//!   `data:` URLs. They are read concurrently and stored in the order they were
//!   attached; a photo that cannot be read leaves an empty slot instead of failing
//!   the post.
//! - **Feed queries**: filter by text, tag, category, author and visit date, with a
//!   small search language (`tag:hanok AND NOT category:public`).
//! - **Reactions**: likes toggle per user; comments are listed oldest first.
//! - **Statistics**: tag usage and the share of posts per building category.
//!
//! ## Usage
//!
//! ```no_run
//! use archlog::prelude::*;
//!
//! async fn publish(db: &Database, author: &User) -> Result<Post, AppError> {
//!     PublishPostCommand::new("Myeongdong Cathedral")
//!         .with_category(Category::Religious)
//!         .with_tags(["gothic", "brick"])
//!         .with_photo(ImageSource::file("cathedral.jpg"))
//!         .execute(db, &DataUrlDecoder, author)
//!         .await
//! }
//! ```

pub mod app;
pub mod config;
pub mod database;
mod dialect;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod photo;
pub mod query;

pub mod prelude {
    pub use crate::app::*;
    pub use crate::config::{Config, ConfigError};
    pub use crate::database::{Database, DatabaseError};
    pub use crate::ingest::{Blob, DataUrlDecoder, Decode, ImageBatch, ImageSource};
    pub use crate::model::*;
    pub use crate::photo::{DecodeError, EncodedImage, PhotoHash};
    pub use crate::query::*;
}
