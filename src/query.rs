//! Query module for building feed and tag queries.
//!
//! Expressions compile to an SQL fragment plus the ordered parameters to bind to it.
//! All parameters are bound as text.

mod post;
mod tag;

pub use post::{PostOrder, PostQuery, PostQueryExpr, PostQueryKind};
pub use tag::{TagQuery, TagQueryExpr, TagQueryKind};

/// Escapes `LIKE` wildcards so user input matches literally (escape character `\`).
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn test_escape_like() {
        assert_eq!("seoul", escape_like("seoul"));
        assert_eq!(r"100\%", escape_like("100%"));
        assert_eq!(r"a\_b\\c", escape_like(r"a_b\c"));
    }
}
