use super::escape_like;
use crate::dialect::{CurrentDialect, Dialect};

/// Represents a logical expression for querying tags.
#[derive(Debug, Clone, PartialEq)]
pub enum TagQueryExpr {
    /// Matches tags that are exactly equal to the given string.
    Exact(String),

    /// Matches tags that start with the given prefix.
    Prefix(String),

    /// Matches tags that contain the given substring.
    Contains(String),

    /// Logical OR of two expressions.
    Or(Box<TagQueryExpr>, Box<TagQueryExpr>),
}

impl TagQueryExpr {
    /// Combines the current expression with another using a logical OR.
    pub fn or(self, other: TagQueryExpr) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    fn build_sql(&self, params: &mut Vec<String>) -> String {
        match self {
            TagQueryExpr::Exact(name) => {
                params.push(name.clone());
                format!("tag_name = {}", CurrentDialect::placeholder(params.len()))
            }
            TagQueryExpr::Prefix(prefix) => {
                params.push(format!("{}%", escape_like(prefix)));
                format!(
                    r"tag_name LIKE {} ESCAPE '\'",
                    CurrentDialect::placeholder(params.len())
                )
            }
            TagQueryExpr::Contains(substr) => {
                params.push(format!("%{}%", escape_like(substr)));
                format!(
                    r"tag_name LIKE {} ESCAPE '\'",
                    CurrentDialect::placeholder(params.len())
                )
            }
            TagQueryExpr::Or(lhs, rhs) => {
                format!("({} OR {})", lhs.build_sql(params), rhs.build_sql(params))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagQueryKind {
    /// Every tag in use.
    All,

    Where(TagQueryExpr),
}

/// A tag listing with optional pagination. Results are sorted by name.
#[derive(Debug, Clone, PartialEq)]
pub struct TagQuery {
    pub expr: TagQueryKind,
    pub limit: Option<u32>,
}

impl TagQuery {
    pub fn new(expr: TagQueryKind) -> Self {
        Self { expr, limit: None }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the condition (with its `WHERE`) and the trailing `LIMIT`, plus parameters.
    ///
    /// The two parts are separate because the condition goes before `GROUP BY`.
    pub fn to_sql(&self) -> (String, String, Vec<String>) {
        let mut params = Vec::new();

        let condition = match &self.expr {
            TagQueryKind::All => "".to_string(),
            TagQueryKind::Where(expr) => format!("WHERE {}", expr.build_sql(&mut params)),
        };

        let limit = match self.limit {
            Some(limit) => {
                params.push(limit.to_string());
                format!(
                    " LIMIT CAST({} AS INTEGER)",
                    CurrentDialect::placeholder(params.len())
                )
            }
            None => "".to_string(),
        };

        (condition, limit, params)
    }
}

#[cfg(test)]
mod tests {
    use super::{TagQuery, TagQueryExpr, TagQueryKind};

    #[test]
    fn test_build_tag_query() {
        let query = TagQuery::new(TagQueryKind::Where(
            TagQueryExpr::Exact("hanok".to_string())
                .or(TagQueryExpr::Prefix("con".to_string()))
                .or(TagQueryExpr::Contains("_".to_string())),
        ))
        .with_limit(5);

        let (condition, limit, params) = query.to_sql();

        assert_eq!(
            r"WHERE ((tag_name = ? OR tag_name LIKE ? ESCAPE '\') OR tag_name LIKE ? ESCAPE '\')",
            condition
        );
        assert_eq!(" LIMIT CAST(? AS INTEGER)", limit);
        assert_eq!(vec!["hanok", "con%", r"%\_%", "5"], params);
    }

    #[test]
    fn test_all_tags() {
        let (condition, limit, params) = TagQuery::new(TagQueryKind::All).to_sql();

        assert_eq!("", condition);
        assert_eq!("", limit);
        assert!(params.is_empty());
    }
}
