//! # Search Parser Module
//!
//! Parses the journal's search box syntax into a [`PostQueryExpr`] that the query
//! module turns into SQL.
//!
//! ## Syntax
//!
//! - A bare word or a `"quoted phrase"` matches building name, location or tags.
//! - `tag:hanok`, `category:public` (key or Korean label), `by:<user id>`.
//! - `date >= 2024-01-31` and `date <= 2024-12-31` bound the visit date.
//! - `AND`, `OR`, `NOT` and parentheses combine the above. `AND` binds tighter
//!   than `OR` and may be left out: `seoul station` is `seoul AND station`.
//!   Keywords are upper case and only match as whole words.
//!
//! ```rust
//! # use archlog::parser::parse_query;
//! # use archlog::query::PostQueryExpr;
//! # use archlog::model::Category;
//! assert_eq!(
//!     PostQueryExpr::tag("concrete")
//!         .and(PostQueryExpr::Category(Category::Public).or(PostQueryExpr::not(
//!             PostQueryExpr::text("seoul station")
//!         ))),
//!     parse_query(r#"tag:concrete AND (category:public OR NOT "seoul station")"#).unwrap()
//! );
//! ```

use crate::{
    model::Category,
    query::{PostQueryExpr, PostQueryKind},
};
use chrono::NaiveDate;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag as t, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{not, opt, verify},
    multi::many0,
    sequence::{delimited, preceded, terminated},
};

const KEYWORDS: [&str; 3] = ["AND", "OR", "NOT"];

// <query>    ::= <or_expr>
// <or_expr>  ::= <and_expr> { "OR" <and_expr> }
// <and_expr> ::= <not_expr> { "AND" <not_expr> }
// <not_expr> ::= [ "NOT" ] <primary>
// <primary>  ::= <date_expr>
//              | <field> ":" ( <quoted> | <word> )
//              | "(" <query> ")"
//              | <quoted>
//              | <word>
pub fn parse_query(input: &str) -> Result<PostQueryExpr, ParseErrorDetail> {
    let (rest, query) = query_expr(input).map_err(|e| match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => ParseErrorDetail {
            kind: ParseErrorKind::UnexpectedToken,
            location: "<incomplete>".to_string(),
        },
    })?;

    if !rest.trim().is_empty() {
        return Err(ParseErrorDetail {
            kind: ParseErrorKind::UnexpectedToken,
            location: rest.to_string(),
        });
    }

    Ok(query)
}

/// Like [`parse_query`], but a blank search matches every post.
pub fn parse_filter(input: &str) -> Result<PostQueryKind, ParseErrorDetail> {
    if input.trim().is_empty() {
        return Ok(PostQueryKind::All);
    }
    parse_query(input).map(PostQueryKind::Where)
}

fn query_expr(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
    fn or_expr(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        let (input, init) = and_expr(input)?;
        many0(preceded(keyword("OR"), and_expr))
            .parse(input)
            .map(|(input, rest)| {
                let expr = rest.into_iter().fold(init, |acc, e| acc.or(e));
                (input, expr)
            })
    }

    fn and_expr(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        let (input, init) = not_expr(input)?;
        many0(preceded(opt(keyword("AND")), not_expr))
            .parse(input)
            .map(|(input, rest)| {
                let expr = rest.into_iter().fold(init, |acc, e| acc.and(e));
                (input, expr)
            })
    }

    fn not_expr(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        let (input, not_opt) = opt(preceded(keyword("NOT"), primary)).parse(input)?;
        match not_opt {
            Some(expr) => Ok((input, PostQueryExpr::not(expr))),
            None => primary(input),
        }
    }

    fn primary(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        alt((date_expr, field_expr, paren_expr, quoted_text, word_text)).parse(input)
    }

    fn date_expr(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        let (input, (_field, op)) = (keyword("date"), ws(alt((t(">="), t("<="))))).parse(input)?;

        let (rest, date_str) = ws(take_while1(|c: char| c.is_ascii_digit() || c == '-'))
            .parse(input)
            .map_err(|_: nom::Err<ParseErrorDetail>| invalid_date(input))?;

        let date =
            NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| invalid_date(date_str))?;

        match op {
            ">=" => Ok((rest, PostQueryExpr::VisitedSince(date))),
            _ => Ok((rest, PostQueryExpr::VisitedUntil(date))),
        }
    }

    fn field_expr(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        let (rest, (field, value)) = (
            preceded(multispace0, terminated(alt((t("tag"), t("category"), t("by"))), char(':'))),
            terminated(alt((quoted, word)), multispace0),
        )
            .parse(input)?;

        match field {
            "tag" => Ok((rest, PostQueryExpr::tag(value))),
            "by" => Ok((rest, PostQueryExpr::author(value))),
            _ => value
                .parse::<Category>()
                .map(|category| (rest, PostQueryExpr::Category(category)))
                .map_err(|_| {
                    nom::Err::Failure(ParseErrorDetail {
                        kind: ParseErrorKind::UnknownCategory,
                        location: value.to_string(),
                    })
                }),
        }
    }

    fn paren_expr(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        delimited(ws(char('(')), query_expr, ws(char(')'))).parse(input)
    }

    fn quoted_text(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        ws(quoted)
            .parse(input)
            .map(|(i, text)| (i, PostQueryExpr::text(text)))
    }

    fn word_text(input: &str) -> IResult<&str, PostQueryExpr, ParseErrorDetail> {
        ws(verify(word, |w: &str| !KEYWORDS.contains(&w)))
            .parse(input)
            .map(|(i, text)| (i, PostQueryExpr::text(text)))
    }

    or_expr(input)
}

fn quoted(input: &str) -> IResult<&str, &str, ParseErrorDetail> {
    delimited(char('"'), is_not("\""), char('"')).parse(input)
}

fn word(input: &str) -> IResult<&str, &str, ParseErrorDetail> {
    take_while1(is_word_char).parse(input)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\'')
}

fn invalid_date(location: &str) -> nom::Err<ParseErrorDetail> {
    nom::Err::Failure(ParseErrorDetail {
        kind: ParseErrorKind::InvalidDateFormat,
        location: location.to_string(),
    })
}

/// Matches `kw` only when it is not the start of a longer word.
fn keyword<'a>(
    kw: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = ParseErrorDetail> {
    ws(terminated(t(kw), not(satisfy(is_word_char))))
}

fn ws<'a, F: 'a>(inner: F) -> impl Parser<&'a str, Output = F::Output, Error = F::Error>
where
    F: Parser<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("invalid date, expected YYYY-MM-DD")]
    InvalidDateFormat,
    #[error("unknown category")]
    UnknownCategory,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} at {location:?}")]
pub struct ParseErrorDetail {
    pub kind: ParseErrorKind,
    pub location: String,
}

impl nom::error::ParseError<&str> for ParseErrorDetail {
    fn from_error_kind(input: &str, _kind: nom::error::ErrorKind) -> Self {
        ParseErrorDetail {
            kind: ParseErrorKind::UnexpectedToken,
            location: input.to_string(),
        }
    }

    fn append(_input: &str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

#[cfg(test)]
mod tests {
    use super::{ParseErrorKind, parse_filter, parse_query};
    use crate::{
        model::Category,
        query::{PostQueryExpr, PostQueryKind},
    };
    use chrono::NaiveDate;

    #[test]
    fn test_parse_query_expr() {
        let input = "tag:hanok AND (category:종교건축 OR NOT church) AND date >= 2024-03-01";

        assert_eq!(
            PostQueryExpr::tag("hanok")
                .and(
                    PostQueryExpr::Category(Category::Religious)
                        .or(PostQueryExpr::not(PostQueryExpr::text("church")))
                )
                .and(PostQueryExpr::VisitedSince(
                    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
                )),
            parse_query(input).unwrap()
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            PostQueryExpr::text("a").or(PostQueryExpr::text("b").and(PostQueryExpr::text("c"))),
            parse_query("a OR b AND c").unwrap()
        );
    }

    #[test]
    fn test_keywords_match_whole_words() {
        assert_eq!(
            PostQueryExpr::text("NOTRE").and(PostQueryExpr::text("ORIGIN")),
            parse_query("NOTRE AND ORIGIN").unwrap()
        );
        assert_eq!(
            PostQueryExpr::text("dated"),
            parse_query("dated").unwrap()
        );
    }

    #[test]
    fn test_quoted_and_fields() {
        assert_eq!(
            PostQueryExpr::text("Seoul Station")
                .or(PostQueryExpr::author("user-1"))
                .or(PostQueryExpr::tag("red brick")),
            parse_query(r#""Seoul Station" OR by:user-1 OR tag:"red brick""#).unwrap()
        );
    }

    #[test]
    fn test_date_until() {
        assert_eq!(
            PostQueryExpr::VisitedUntil(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()),
            parse_query("date<=2023-12-31").unwrap()
        );
    }

    #[test]
    fn test_invalid_date() {
        let err = parse_query("date >= 2024-13-01").unwrap_err();
        assert_eq!(ParseErrorKind::InvalidDateFormat, err.kind);
        assert_eq!("2024-13-01", err.location);

        let err = parse_query("seoul AND date >= yesterday").unwrap_err();
        assert_eq!(ParseErrorKind::InvalidDateFormat, err.kind);
    }

    #[test]
    fn test_unknown_category() {
        let err = parse_query("category:castle").unwrap_err();
        assert_eq!(ParseErrorKind::UnknownCategory, err.kind);
        assert_eq!("castle", err.location);
    }

    #[test]
    fn test_implicit_and() {
        assert_eq!(
            Ok(PostQueryExpr::text("Seoul").and(PostQueryExpr::text("Station"))),
            parse_query("Seoul Station")
        );
        assert_eq!(
            parse_query("tag:hanok AND NOT category:public"),
            parse_query("tag:hanok NOT category:public")
        );
        assert_eq!(
            Ok(PostQueryExpr::text("seoul")
                .and(PostQueryExpr::text("station"))
                .or(PostQueryExpr::tag("rail"))),
            parse_query("seoul station OR tag:rail")
        );
    }

    #[test]
    fn test_unexpected_token() {
        assert_eq!(
            ParseErrorKind::UnexpectedToken,
            parse_query("seoul )").unwrap_err().kind
        );
        assert_eq!(
            ParseErrorKind::UnexpectedToken,
            parse_query("seoul AND").unwrap_err().kind
        );
        assert_eq!(
            ParseErrorKind::UnexpectedToken,
            parse_query("(seoul").unwrap_err().kind
        );
        assert_eq!(
            ParseErrorKind::UnexpectedToken,
            parse_query("AND").unwrap_err().kind
        );
    }

    #[test]
    fn test_blank_filter_matches_all() {
        assert_eq!(Ok(PostQueryKind::All), parse_filter("   "));
        assert_eq!(
            Ok(PostQueryKind::Where(PostQueryExpr::text("museum"))),
            parse_filter("museum")
        );
    }
}
