use archlog::{database, prelude::*};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "archlog")]
#[command(about = "Architecture journal CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Registers a user and makes it the current one.
    Login {
        username: String,

        #[arg(short, long)]
        bio: Option<String>,
    },

    /// Shows the current user.
    Whoami,

    /// Publishes a post, or edits one with `--edit`.
    Post {
        #[arg(help = "Building name")]
        building_name: String,

        #[arg(short, long, default_value = "religious", help = "Category key or label")]
        category: Category,

        #[arg(short, long, default_value = "")]
        location: String,

        #[arg(short, long, help = "Visit date (YYYY-MM-DD), defaults to today")]
        date: Option<NaiveDate>,

        #[arg(short, long, default_value = "")]
        note: String,

        #[arg(short, long, help = "Tags (comma separated)")]
        tags: Option<String>,

        #[arg(long, help = "Mood colour, #rrggbb")]
        color: Option<String>,

        #[arg(long, help = "Only visible to you")]
        private: bool,

        #[arg(long, conflicts_with = "private", help = "Visible to everyone (the default for new posts)")]
        public: bool,

        #[arg(short, long = "photo", help = "Photo file or data: URL, repeatable; the first is the cover")]
        photos: Vec<ImageSource>,

        #[arg(long, value_name = "POST_ID")]
        edit: Option<String>,
    },

    /// Deletes one of your posts.
    Delete { post_id: String },

    /// Lists posts.
    Feed {
        #[arg(short, long, help = "Search, e.g. 'tag:hanok AND date >= 2024-01-01'")]
        query: Option<String>,

        #[arg(long, help = "Only your own posts")]
        mine: bool,

        #[arg(long, default_value = "newest", help = "newest, date-desc, date-asc or name-asc")]
        sort: PostOrder,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Shows a post with its comments.
    Show { post_id: String },

    /// Likes a post, or takes the like back.
    Like { post_id: String },

    Comment { post_id: String, content: String },

    /// Lists tags in use.
    Tags {
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Shows the share of posts per category.
    Stats,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open database: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no current user, run `archlog login <name>` first")]
    NotLoggedIn,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = Config::load()?;

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let db = Database::with_migration(database::connect(&config.database_path()).await?).await?;

    let me = current_user(&db).await?;
    let require_login = || me.clone().ok_or(CliError::NotLoggedIn);
    let viewer = me.as_ref().map(|u| u.id.as_str());

    match cli.command {
        Commands::Login { username, bio } => {
            let user = register_user(&db, &username, bio.as_deref()).await?;
            println!("✅ Logged in as {} ({})", user.username, user.id);
        }
        Commands::Whoami => {
            let user = require_login()?;
            println!("{} ({})", user.username, user.id);
            println!("{}", user.bio);
        }
        Commands::Post {
            building_name,
            category,
            location,
            date,
            note,
            tags,
            color,
            private,
            public,
            photos,
            edit,
        } => {
            let author = require_login()?;

            let mut cmd = PublishPostCommand::new(building_name)
                .with_category(category)
                .with_location(location)
                .with_note(note)
                .with_tags(split_tags(&tags.unwrap_or_default()))
                .with_photos(photos);
            if let Some(date) = date {
                cmd = cmd.with_visit_date(date);
            }
            if let Some(color) = color {
                cmd = cmd.with_emotion_color(color);
            }
            if private || public {
                cmd = cmd.with_visibility(public);
            }
            if let Some(post_id) = edit {
                cmd = cmd.editing(post_id);
            }

            let post = cmd.execute(&db, &DataUrlDecoder, &author).await?;

            println!("✅ Published post:");
            print_post(&post);
        }
        Commands::Delete { post_id } => {
            let author = require_login()?;
            remove_post(&db, &post_id, &author).await?;
            println!("🗑️  Deleted {post_id}");
        }
        Commands::Feed {
            query,
            mine,
            sort,
            page,
            limit,
        } => {
            let mine = if mine {
                Some(PostQueryExpr::author(require_login()?.id))
            } else {
                None
            };
            let filter = build_filter(query.as_deref().unwrap_or_default(), mine)?;

            let mut query = PostQuery::new(filter).with_order(sort);
            if let Some(viewer) = viewer {
                query = query.with_viewer(viewer);
            }
            let total = count_posts(&db, &query).await?;
            let query = query.with_page(page, limit.unwrap_or(config.page_size));

            for post in query_posts(&db, &query).await? {
                print_post(&post);
                println!();
            }
            println!("page {page}, {total} posts in total");
        }
        Commands::Show { post_id } => {
            let post = find_post_by_id(&db, &post_id, viewer).await?;
            print_post(&post);

            for comment in comments_for(&db, &post_id, viewer).await? {
                println!(
                    "  💬 {} ({}): {}",
                    comment.username,
                    comment.created_at.format("%Y-%m-%d %H:%M"),
                    comment.content
                );
            }
        }
        Commands::Like { post_id } => {
            let user = require_login()?;
            let state = toggle_like(&db, &post_id, &user).await?;
            let mark = if state.liked { "❤️" } else { "🤍" };
            println!("{mark} {} likes", state.count);
        }
        Commands::Comment { post_id, content } => {
            let user = require_login()?;
            let comment = add_comment(&db, &post_id, &user, &content).await?;
            println!("💬 {}: {}", comment.username, comment.content);
        }
        Commands::Tags { prefix } => {
            let query = match prefix {
                Some(prefix) => TagQuery::new(TagQueryKind::Where(TagQueryExpr::Prefix(prefix))),
                None => TagQuery::new(TagQueryKind::All),
            };
            for tag in query_tags(&db, &query).await? {
                println!("#{} ({})", tag.name, tag.post_count);
            }
        }
        Commands::Stats => {
            let stats = category_stats(&db).await?;
            for entry in &stats.entries {
                println!(
                    "{:<8} {:>4} {:>5.1}%",
                    entry.category.label(),
                    entry.count,
                    entry.percentage
                );
            }
            println!("{} posts", stats.total);
        }
    }

    Ok(())
}

fn print_post(post: &Post) {
    let visibility = if post.is_public { "" } else { " 🔒" };
    println!("🏛️  {}{} [{}]", post.building_name, visibility, post.id);
    println!(
        "   {} · {} · visited {} · by {}",
        post.category,
        post.location,
        post.visit_date,
        post.username
    );
    if !post.tags.is_empty() {
        let tags: Vec<String> = post.tags.iter().map(|t| format!("#{t}")).collect();
        println!("   {}", tags.join(" "));
    }
    if let Some(color) = &post.emotion_color {
        println!("   mood {color}");
    }
    if !post.note.is_empty() {
        println!("   {}", post.note);
    }
    let absent = post.photos.iter().filter(|p| p.is_none()).count();
    println!(
        "   📷 {} photos ({} unreadable) · ❤️ {} · 💬 {}",
        post.photos.len(),
        absent,
        post.like_count,
        post.comment_count
    );
}
