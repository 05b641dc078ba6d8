//! Request expression parser using nom.
//!
//! Parses the textual form of [`QueryOperation`] requests used on the
//! command line.
//!
//! # Syntax Overview
//!
//! ```text
//! NameEquals(name='Rock', limit=10)  ByName(direction=desc)  IsActive
//! ────┬───── ──────────┬──────────
//!     │                └── Arguments: key=value, comma separated
//!     └── Operation name
//! ```
//!
//! Values are single-quoted strings (`''` escapes a quote) or bare words,
//! which are read as integers, floats, `true`/`false`, `null` or text.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, value},
    multi::{fold_many0, many0, separated_list0},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
};

use crate::compose::QueryOperation;
use crate::error::{WeaveError, WeaveResult};
use crate::value::Value;

/// Parse a single request such as `NameEquals(name='Rock')`.
pub fn parse_request(input: &str) -> WeaveResult<QueryOperation> {
    let input = input.trim();
    finish(input, parse_operation(input))
}

/// Parse whitespace-separated requests such as `A(x=1) B`.
pub fn parse_requests(input: &str) -> WeaveResult<Vec<QueryOperation>> {
    let input = input.trim();
    finish(
        input,
        many0(terminated(parse_operation, multispace0))(input),
    )
}

fn finish<T>(input: &str, result: IResult<&str, T>) -> WeaveResult<T> {
    match result {
        Ok(("", parsed)) => Ok(parsed),
        Ok((remaining, _)) => Err(WeaveError::parse(
            input.len() - remaining.len(),
            format!("Unexpected trailing content: '{}'", remaining),
        )),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(WeaveError::parse(
            input.len() - e.input.len(),
            format!("Parse failed: {:?}", e.code),
        )),
        Err(nom::Err::Incomplete(_)) => {
            Err(WeaveError::parse(input.len(), "Unexpected end of input"))
        }
    }
}

/// Parse one operation with optional argument list.
fn parse_operation(input: &str) -> IResult<&str, QueryOperation> {
    let (input, name) = parse_identifier(input)?;
    let (input, arguments) = opt(preceded(multispace0, parse_arguments))(input)?;

    let mut operation = QueryOperation::new(name);
    operation.parameters.extend(arguments.unwrap_or_default());
    Ok((input, operation))
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// Parse `(key=value, ...)`. A trailing comma is allowed.
fn parse_arguments(input: &str) -> IResult<&str, Vec<(String, Value)>> {
    delimited(
        pair(char('('), multispace0),
        terminated(
            separated_list0(tuple((multispace0, char(','), multispace0)), parse_argument),
            opt(pair(multispace0, char(','))),
        ),
        pair(multispace0, char(')')),
    )(input)
}

fn parse_argument(input: &str) -> IResult<&str, (String, Value)> {
    map(
        separated_pair(
            parse_identifier,
            tuple((multispace0, char('='), multispace0)),
            parse_value,
        ),
        |(key, value)| (key.to_string(), value),
    )(input)
}

fn parse_value(input: &str) -> IResult<&str, Value> {
    alt((parse_quoted_string, parse_bare_word))(input)
}

/// Parse a quoted string.
fn parse_quoted_string(input: &str) -> IResult<&str, Value> {
    let (input, content) = delimited(
        char('\''),
        fold_many0(
            alt((value("'", tag("''")), is_not("'"))),
            String::new,
            |mut acc, part: &str| {
                acc.push_str(part);
                acc
            },
        ),
        char('\''),
    )(input)?;

    Ok((input, Value::Text(content)))
}

/// Parse an unquoted literal up to whitespace, `,` or `)`.
fn parse_bare_word(input: &str) -> IResult<&str, Value> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != ',' && c != ')' && c != '('),
        Value::parse_literal,
    )(input)
}
