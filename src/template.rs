//! Positional-slot SQL templates.
//!
//! A template is SQL text with numbered slots:
//!
//! ```text
//! "Name" LIKE {0} AND "GenreId" > {1}
//!             ─┬─                 ─┬─
//!              │                   └── slot 1
//!              └── slot 0
//! ```
//!
//! `{{` and `}}` stand for literal braces.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_res, value},
    multi::many0,
    sequence::delimited,
};

use crate::error::{WeaveError, WeaveResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(usize),
}

/// A parsed template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string.
    ///
    /// # Example
    ///
    /// ```
    /// use sqlweave::template::Template;
    ///
    /// let t = Template::parse("[Name] = {0}").unwrap();
    /// assert_eq!(t.render(&["@name_1"]), "[Name] = @name_1");
    /// ```
    pub fn parse(source: &str) -> WeaveResult<Self> {
        match parse_segments(source) {
            Ok(("", segments)) => Ok(Self {
                source: source.to_string(),
                segments,
            }),
            Ok((remaining, _)) => {
                let position = source.len() - remaining.len();
                let message = if remaining.starts_with('}') {
                    "unmatched '}' (use '}}' for a literal brace)".to_string()
                } else {
                    format!(
                        "expected a slot like '{{0}}' (use '{{{{' for a literal brace), found '{}'",
                        remaining.chars().take(8).collect::<String>()
                    )
                };
                Err(WeaveError::template(position, message))
            }
            Err(e) => Err(WeaveError::template(0, format!("Parse failed: {:?}", e))),
        }
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Highest slot index plus one; zero for a template without slots.
    pub fn slot_count(&self) -> usize {
        self.slot_indices()
            .last()
            .map(|highest| highest + 1)
            .unwrap_or(0)
    }

    /// Distinct slot indices used by the template.
    pub fn slot_indices(&self) -> BTreeSet<usize> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Slot(index) => Some(*index),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute `args[n]` into slot `n`.
    ///
    /// Slots without a matching argument render as the empty string.
    pub fn render<S: AsRef<str>>(&self, args: &[S]) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(index) => {
                    if let Some(arg) = args.get(*index) {
                        out.push_str(arg.as_ref());
                    }
                }
            }
        }
        out
    }
}

impl FromStr for Template {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse the whole template into literal and slot segments.
fn parse_segments(input: &str) -> IResult<&str, Vec<Segment>> {
    let (input, raw) = many0(alt((parse_escape, parse_slot, parse_literal)))(input)?;

    // Merge adjacent literals so rendering is one push per run of text.
    let mut segments: Vec<Segment> = Vec::with_capacity(raw.len());
    for segment in raw {
        match (segments.last_mut(), segment) {
            (Some(Segment::Literal(prev)), Segment::Literal(next)) => prev.push_str(&next),
            (_, segment) => segments.push(segment),
        }
    }
    Ok((input, segments))
}

/// Parse `{{` or `}}`.
fn parse_escape(input: &str) -> IResult<&str, Segment> {
    map(
        alt((value("{", tag("{{")), value("}", tag("}}")))),
        |brace: &str| Segment::Literal(brace.to_string()),
    )(input)
}

/// Parse a slot `{N}`.
fn parse_slot(input: &str) -> IResult<&str, Segment> {
    map(
        map_res(delimited(char('{'), digit1, char('}')), str::parse::<usize>),
        Segment::Slot,
    )(input)
}

/// Parse a run of text without braces.
fn parse_literal(input: &str) -> IResult<&str, Segment> {
    map(take_while1(|c| c != '{' && c != '}'), |text: &str| {
        Segment::Literal(text.to_string())
    })(input)
}
