//! Journal entities as the application sees them.

use crate::photo::EncodedImage;
use chrono::{DateTime, NaiveDate, Utc};
use std::{fmt::Display, str::FromStr};

/// Bio given to users who register without one.
pub const DEFAULT_BIO: &str = "Architecture enthusiast";

/// A journal author.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

/// The building type a post is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Category {
    /// 종교건축
    #[default]
    Religious,
    /// 주거건축
    Residential,
    /// 공공건축
    Public,
    /// 상업건축
    Commercial,
    /// 문화건축
    Cultural,
    /// 기타
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Religious,
        Category::Residential,
        Category::Public,
        Category::Commercial,
        Category::Cultural,
        Category::Other,
    ];

    /// Stable key used in the store and in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Religious => "religious",
            Category::Residential => "residential",
            Category::Public => "public",
            Category::Commercial => "commercial",
            Category::Cultural => "cultural",
            Category::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Religious => "종교건축",
            Category::Residential => "주거건축",
            Category::Public => "공공건축",
            Category::Commercial => "상업건축",
            Category::Cultural => "문화건축",
            Category::Other => "기타",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepts either the key (`"public"`, any case) or the Korean label (`"공공건축"`).
impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s) || c.label() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

/// A journal entry about one building visit.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    /// Author name at the time of posting.
    pub username: String,
    pub building_name: String,
    pub category: Category,
    pub location: String,
    pub visit_date: NaiveDate,
    pub note: String,
    pub tags: Vec<String>,
    /// `#rrggbb` mood colour picked by the author.
    pub emotion_color: Option<String>,
    pub is_public: bool,
    /// One slot per attached photo, in attachment order. `None` marks a photo that
    /// could not be decoded.
    pub photos: Vec<Option<EncodedImage>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub like_count: u64,
    pub comment_count: u64,
}

impl Post {
    /// The first attached photo.
    pub fn cover(&self) -> Option<&EncodedImage> {
        self.photos.first().and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of toggling a like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub post_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStat {
    pub category: Category,
    pub count: u64,
    /// Share of all posts, in percent.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoryStats {
    pub total: u64,
    pub entries: Vec<CategoryStat>,
}

impl CategoryStats {
    /// Builds per-category shares, keeping only categories that have posts.
    pub fn from_counts<I: IntoIterator<Item = (Category, u64)>>(counts: I) -> Self {
        let counts: Vec<(Category, u64)> = counts.into_iter().collect();
        let total = counts.iter().map(|(_, n)| n).sum::<u64>();

        let mut entries: Vec<CategoryStat> = counts
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(category, count)| CategoryStat {
                category,
                count,
                percentage: count as f64 * 100.0 / total as f64,
            })
            .collect();
        entries.sort_by_key(|e| e.category);

        CategoryStats { total, entries }
    }
}

/// Trims, drops empties and duplicates, keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Splits the comma separated tag field of the upload form.
pub fn split_tags(input: &str) -> Vec<String> {
    normalize_tags(input.split(','))
}

#[cfg(test)]
mod tests {
    use super::{Category, CategoryStats, split_tags};

    #[test]
    fn test_category_from_str() {
        assert_eq!(Ok(Category::Public), "public".parse());
        assert_eq!(Ok(Category::Public), "PUBLIC".parse());
        assert_eq!(Ok(Category::Religious), "종교건축".parse());
        assert_eq!(Ok(Category::Other), " 기타 ".parse());
        assert!("castle".parse::<Category>().is_err());
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(
            vec!["brutalism", "concrete", "seoul"],
            split_tags(" brutalism, concrete,,seoul , concrete")
        );
        assert!(split_tags("  ,  ").is_empty());
    }

    #[test]
    fn test_category_stats() {
        let stats = CategoryStats::from_counts([
            (Category::Cultural, 1),
            (Category::Religious, 3),
            (Category::Public, 0),
        ]);

        assert_eq!(4, stats.total);
        assert_eq!(2, stats.entries.len());
        assert_eq!(Category::Religious, stats.entries[0].category);
        assert_eq!(75.0, stats.entries[0].percentage);
        assert_eq!(Category::Cultural, stats.entries[1].category);
        assert_eq!(25.0, stats.entries[1].percentage);

        assert_eq!(CategoryStats::default(), CategoryStats::from_counts([]));
    }
}
