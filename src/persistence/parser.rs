//! Boot-configuration parser.
//!
//! Grammar:
//!
//! ```text
//! file      := (ws statement)* ws EOF
//! statement := word (space word)* [space? block]
//! block     := '{' (ws statement)* ws '}'
//! word      := bare | '"' escaped '"'
//! ws        := (whitespace | '/* ... */')*
//! ```
//!
//! Parsing is schema-free: every statement's words extend the enclosing
//! block's path, so `interfaces { dataplane dp0s3 { mtu 1500 } }` yields
//! the path `interfaces dataplane dp0s3 mtu 1500`. The last comment before
//! a statement becomes the comment of the node at that full path.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_until, take_while1},
    character::complete::{char, multispace1, space0, space1},
    combinator::{all_consuming, map, opt, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use thiserror::Error;

use crate::tree::ConfigNode;

/// A file that is not valid boot-configuration syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}")]
pub struct ParseError {
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Statement {
    comment: Option<String>,
    words: Vec<String>,
    block: Option<Vec<Statement>>,
}

/// Parse boot-configuration text into a tree.
pub fn parse_config(input: &str) -> Result<ConfigNode, ParseError> {
    let (_, statements) = all_consuming(terminated(statements, ws))(input).map_err(|e| {
        let rest = match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
            nom::Err::Incomplete(_) => "",
        };
        let offset = input.len() - rest.len();
        ParseError {
            line: input[..offset].matches('\n').count() + 1,
        }
    })?;

    let mut tree = ConfigNode::new();
    let mut prefix = Vec::new();
    build(&mut tree, &mut prefix, &statements);
    Ok(tree)
}

fn build(tree: &mut ConfigNode, prefix: &mut Vec<String>, statements: &[Statement]) {
    for statement in statements {
        let depth = prefix.len();
        prefix.extend(statement.words.iter().cloned());
        let node = tree.ensure(prefix);
        if statement.comment.is_some() {
            node.set_comment(statement.comment.clone());
        }
        if let Some(block) = &statement.block {
            build(tree, prefix, block);
        }
        prefix.truncate(depth);
    }
}

fn comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("/*"), take_until("*/"), tag("*/"))(input)
}

fn ws(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment))))(input)
}

/// Whitespace and comments before a statement, keeping the last comment.
fn leading(input: &str) -> IResult<&str, Option<String>> {
    map(
        many0(alt((value(None, multispace1), map(comment, Some)))),
        |items: Vec<Option<&str>>| {
            items
                .into_iter()
                .flatten()
                .last()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        },
    )(input)
}

fn bare_word(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, '{' | '}' | '"')),
        str::to_string,
    )(input)
}

fn quoted_word(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                )),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(input)
}

fn word(input: &str) -> IResult<&str, String> {
    alt((quoted_word, bare_word))(input)
}

fn block(input: &str) -> IResult<&str, Vec<Statement>> {
    delimited(char('{'), statements, preceded(ws, char('}')))(input)
}

fn statement(input: &str) -> IResult<&str, Statement> {
    map(
        pair(
            leading,
            pair(separated_list1(space1, word), opt(preceded(space0, block))),
        ),
        |(comment, (words, block))| Statement {
            comment,
            words,
            block,
        },
    )(input)
}

fn statements(input: &str) -> IResult<&str, Vec<Statement>> {
    many0(statement)(input)
}
