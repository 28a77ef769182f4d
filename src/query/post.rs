use super::escape_like;
use crate::{
    dialect::{CurrentDialect, Dialect},
    model::Category,
};
use chrono::NaiveDate;
use std::str::FromStr;

/// Represents a logical expression for filtering posts.
#[derive(Debug, Clone, PartialEq)]
pub enum PostQueryExpr {
    /// Case-insensitive substring of the building name, the location, or any tag.
    Text(String),

    /// Posts carrying exactly this tag.
    Tag(String),

    Category(Category),

    /// Posts written by the given user id.
    Author(String),

    /// Visited on or after the date.
    VisitedSince(NaiveDate),

    /// Visited on or before the date.
    VisitedUntil(NaiveDate),

    /// Logical AND of two subexpressions.
    And(Box<PostQueryExpr>, Box<PostQueryExpr>),

    /// Logical OR of two subexpressions.
    Or(Box<PostQueryExpr>, Box<PostQueryExpr>),

    /// Logical NOT of a subexpression.
    Not(Box<PostQueryExpr>),
}

impl PostQueryExpr {
    pub fn text<T: Into<String>>(text: T) -> Self {
        PostQueryExpr::Text(text.into())
    }

    pub fn tag<T: Into<String>>(tag: T) -> Self {
        PostQueryExpr::Tag(tag.into())
    }

    pub fn author<T: Into<String>>(user_id: T) -> Self {
        PostQueryExpr::Author(user_id.into())
    }

    /// Combines two expressions with a logical AND.
    pub fn and(self, other: PostQueryExpr) -> Self {
        PostQueryExpr::And(Box::new(self), Box::new(other))
    }

    /// Combines two expressions with a logical OR.
    pub fn or(self, other: PostQueryExpr) -> Self {
        PostQueryExpr::Or(Box::new(self), Box::new(other))
    }

    /// Negates a query expression.
    pub fn not(expr: PostQueryExpr) -> Self {
        PostQueryExpr::Not(Box::new(expr))
    }

    /// Converts the expression into an SQL condition and its bound parameters.
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut params = Vec::new();
        let sql = self.build_sql(&mut params);
        (sql, params)
    }

    fn build_sql(&self, params: &mut Vec<String>) -> String {
        match self {
            PostQueryExpr::Text(text) => {
                let pattern = format!("%{}%", escape_like(text));
                let first = params.len() + 1;
                params.extend(std::iter::repeat_n(pattern, 3));
                CurrentDialect::text_match_query(first)
            }
            PostQueryExpr::Tag(tag) => {
                params.push(tag.clone());
                CurrentDialect::exists_tag_query(params.len())
            }
            PostQueryExpr::Category(category) => {
                params.push(category.as_str().to_string());
                CurrentDialect::category_query(params.len())
            }
            PostQueryExpr::Author(user_id) => {
                params.push(user_id.clone());
                CurrentDialect::author_query(params.len())
            }
            PostQueryExpr::VisitedSince(date) => {
                params.push(date.format("%Y-%m-%d").to_string());
                CurrentDialect::visited_since_query(params.len())
            }
            PostQueryExpr::VisitedUntil(date) => {
                params.push(date.format("%Y-%m-%d").to_string());
                CurrentDialect::visited_until_query(params.len())
            }
            PostQueryExpr::And(lhs, rhs) => {
                format!("({} AND {})", lhs.build_sql(params), rhs.build_sql(params))
            }
            PostQueryExpr::Or(lhs, rhs) => {
                format!("({} OR {})", lhs.build_sql(params), rhs.build_sql(params))
            }
            PostQueryExpr::Not(expr) => {
                format!("NOT {}", expr.build_sql(params))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostQueryKind {
    All,
    Where(PostQueryExpr),
}

impl PostQueryKind {
    /// Folds a list of expressions into one AND-ed filter; an empty list matches all.
    pub fn all_of<I: IntoIterator<Item = PostQueryExpr>>(exprs: I) -> Self {
        exprs
            .into_iter()
            .reduce(PostQueryExpr::and)
            .map(PostQueryKind::Where)
            .unwrap_or(PostQueryKind::All)
    }
}

/// Feed ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrder {
    /// Most recently posted first.
    #[default]
    Newest,
    /// Most recent visit first.
    VisitedDesc,
    /// Oldest visit first.
    VisitedAsc,
    /// Building name, A to Z.
    NameAsc,
}

impl PostOrder {
    fn to_sql(self) -> &'static str {
        match self {
            PostOrder::Newest => "ORDER BY posts.created_at DESC, posts.rowid DESC",
            PostOrder::VisitedDesc => "ORDER BY posts.visit_date DESC, posts.created_at DESC",
            PostOrder::VisitedAsc => "ORDER BY posts.visit_date ASC, posts.created_at ASC",
            PostOrder::NameAsc => "ORDER BY posts.building_name ASC, posts.created_at DESC",
        }
    }
}

impl FromStr for PostOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(PostOrder::Newest),
            "date-desc" | "visited-desc" => Ok(PostOrder::VisitedDesc),
            "date-asc" | "visited-asc" => Ok(PostOrder::VisitedAsc),
            "name-asc" | "name" => Ok(PostOrder::NameAsc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Represents a full feed query: filter, visibility, ordering and pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct PostQuery {
    /// The logical expression used for filtering.
    pub expr: PostQueryKind,

    /// The user the feed is built for. Private posts are only visible to their
    /// author; without a viewer only public posts match.
    pub viewer: Option<String>,

    pub order: PostOrder,

    /// The maximum number of results to return.
    pub limit: Option<u32>,

    /// The offset into the result set.
    pub offset: Option<u32>,
}

impl PostQuery {
    pub fn new(expr: PostQueryKind) -> Self {
        Self {
            expr,
            viewer: None,
            order: PostOrder::default(),
            limit: None,
            offset: None,
        }
    }

    pub fn with_viewer<T: Into<String>>(mut self, user_id: T) -> Self {
        self.viewer = Some(user_id.into());
        self
    }

    pub fn with_order(mut self, order: PostOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the `LIMIT` for this query.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the `OFFSET` for this query.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets limit and offset for a 1-based page number.
    ///
    /// Pages past `u32::MAX` rows clamp to the last offset and come back empty.
    pub fn with_page(self, page: u32, per_page: u32) -> Self {
        self.with_limit(per_page)
            .with_offset(page.saturating_sub(1).saturating_mul(per_page))
    }

    /// The `WHERE` clause alone: filter plus visibility.
    pub fn condition_sql(&self) -> (String, Vec<String>) {
        let mut params = Vec::new();

        let filter = match &self.expr {
            PostQueryKind::All => None,
            PostQueryKind::Where(expr) => Some(expr.build_sql(&mut params)),
        };

        let visibility = match &self.viewer {
            Some(viewer) => {
                params.push(viewer.clone());
                CurrentDialect::visible_to_query(params.len())
            }
            None => CurrentDialect::public_only_query(),
        };

        let sql = match filter {
            Some(filter) => format!("WHERE {} AND {}", filter, visibility),
            None => format!("WHERE {}", visibility),
        };

        (sql, params)
    }

    /// Converts the full query into an SQL string and bound parameters.
    ///
    /// The generated SQL includes ordering and any specified LIMIT or OFFSET.
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let (mut sql, mut params) = self.condition_sql();

        sql.push(' ');
        sql.push_str(self.order.to_sql());

        if let Some(limit) = self.limit {
            params.push(limit.to_string());
            sql.push_str(
                format!(
                    " LIMIT CAST({} AS INTEGER)",
                    CurrentDialect::placeholder(params.len())
                )
                .as_str(),
            );
        }

        if let Some(offset) = self.offset {
            if self.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            params.push(offset.to_string());
            sql.push_str(
                format!(
                    " OFFSET CAST({} AS INTEGER)",
                    CurrentDialect::placeholder(params.len())
                )
                .as_str(),
            );
        }

        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::{CurrentDialect, Dialect, PostOrder, PostQuery, PostQueryExpr, PostQueryKind};
    use crate::model::Category;
    use chrono::NaiveDate;

    #[test]
    fn test_build_query() {
        let query = PostQuery::new(PostQueryKind::Where(
            PostQueryExpr::tag("concrete")
                .and(PostQueryExpr::Category(Category::Public))
                .or(PostQueryExpr::not(PostQueryExpr::text("50%")))
                .and(PostQueryExpr::VisitedUntil(
                    NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
                )),
        ))
        .with_viewer("user-1")
        .with_order(PostOrder::NameAsc)
        .with_limit(10)
        .with_offset(20);

        let (sql, params) = query.to_sql();

        assert_eq!(
            format!(
                "WHERE ((({} AND {}) OR NOT {}) AND {}) AND {} ORDER BY posts.building_name ASC, posts.created_at DESC LIMIT CAST({} AS INTEGER) OFFSET CAST({} AS INTEGER)",
                CurrentDialect::exists_tag_query(1),
                CurrentDialect::category_query(2),
                CurrentDialect::text_match_query(3),
                CurrentDialect::visited_until_query(6),
                CurrentDialect::visible_to_query(7),
                CurrentDialect::placeholder(8),
                CurrentDialect::placeholder(9),
            ),
            sql
        );
        assert_eq!(
            vec![
                "concrete",
                "public",
                r"%50\%%",
                r"%50\%%",
                r"%50\%%",
                "2025-05-02",
                "user-1",
                "10",
                "20",
            ],
            params
        );
    }

    #[test]
    fn test_public_only_without_viewer() {
        let (sql, params) = PostQuery::new(PostQueryKind::All).condition_sql();

        assert_eq!(
            format!("WHERE {}", CurrentDialect::public_only_query()),
            sql
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_page_to_offset() {
        let query = PostQuery::new(PostQueryKind::All).with_page(3, 20);
        assert_eq!(Some(20), query.limit);
        assert_eq!(Some(40), query.offset);

        let query = PostQuery::new(PostQueryKind::All).with_page(0, 20);
        assert_eq!(Some(0), query.offset);
    }

    #[test]
    fn test_page_offset_saturates() {
        let query = PostQuery::new(PostQueryKind::All).with_page(u32::MAX, 20);
        assert_eq!(Some(20), query.limit);
        assert_eq!(Some(u32::MAX), query.offset);

        let query = PostQuery::new(PostQueryKind::All).with_page(300_000_000, u32::MAX);
        assert_eq!(Some(u32::MAX), query.offset);
    }

    #[test]
    fn test_all_of() {
        assert_eq!(PostQueryKind::All, PostQueryKind::all_of([]));
        assert_eq!(
            PostQueryKind::Where(PostQueryExpr::tag("a").and(PostQueryExpr::tag("b"))),
            PostQueryKind::all_of([PostQueryExpr::tag("a"), PostQueryExpr::tag("b")])
        );
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!(Ok(PostOrder::VisitedDesc), "date-desc".parse());
        assert_eq!(Ok(PostOrder::NameAsc), "name".parse());
        assert!("random".parse::<PostOrder>().is_err());
    }
}
