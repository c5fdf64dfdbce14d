//! The task record grammar.
//!
//! One task per line:
//!
//! ```text
//! [name1:"value1" name2:"value2"]
//! ```
//!
//! Values are escaped with the JSON string escapes. Attributes with empty
//! values are omitted when composing, so `decode(encode(t))` restores every
//! attribute of `t` that had a non-empty value.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{anychar, char, space0, space1},
    combinator::recognize,
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, separated_pair},
};
use tasksync_types::{
    task::Task,
    utils::{escape_value, unescape_value},
};
use thiserror::Error;

use crate::{decode::Decoder, encode::Encoder};

/// Error during record decoding.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum RecordDecodeError {
    #[error("Record not recognized as format 4.")]
    NotARecord,
    #[error("Empty record in input.")]
    Empty,
    #[error("Unrecognized characters at end of line.")]
    TrailingGarbage,
    #[error("Duplicate attribute '{0}' in record.")]
    DuplicateAttribute(String),
    #[error("Record is not valid UTF-8.")]
    NotUtf8,
}

/// `attr-name = 1*<printable, except ":" / DQUOTE / "[" / "]" / SP>`
fn is_name_char(c: char) -> bool {
    !c.is_control() && !matches!(c, ':' | '"' | '[' | ']' | ' ')
}

fn is_plain_value_char(c: char) -> bool {
    !matches!(c, '"' | '\\')
}

/// `value = DQUOTE *(plain-char / "\" ANY) DQUOTE`
///
/// Returns the raw escaped interior; unescaping happens in [`attribute`].
fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(
        char('"'),
        recognize(many0(alt((
            take_while1(is_plain_value_char),
            recognize(preceded(char('\\'), anychar)),
        )))),
        char('"'),
    )(input)
}

/// `attribute = attr-name ":" value`
fn attribute(input: &str) -> IResult<&str, (String, String)> {
    let (rest, (name, raw)) =
        separated_pair(take_while1(is_name_char), char(':'), quoted)(input)?;

    let mut value = unescape_value(raw);
    if name == "recur" {
        value = rectify_recurrence(value);
    }

    Ok((rest, (name.to_string(), value)))
}

/// `record = "[" *SP attribute *(1*SP attribute) *SP "]"`
fn attributes(input: &str) -> IResult<&str, Vec<(String, String)>> {
    delimited(
        char('['),
        delimited(space0, separated_list1(space1, attribute), space0),
        char(']'),
    )(input)
}

/// Legacy value translation of `recur:3m` → `recur:3mo`.
///
/// Old clients wrote bare `m` for months; the current period grammar reads
/// `m` as minutes. One-way: the encoder never emits the old form.
fn rectify_recurrence(value: String) -> String {
    let legacy_months = value
        .strip_suffix('m')
        .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_digit()));

    if legacy_months { value + "o" } else { value }
}

fn bracket_interior_is_blank(line: &str) -> bool {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|interior| interior.trim().is_empty())
}

/// Decode one record line into a [`Task`].
///
/// A single trailing newline is tolerated; anything else after the closing
/// bracket is rejected.
pub fn parse(input: &str) -> Result<Task, RecordDecodeError> {
    let line = input.strip_suffix('\n').unwrap_or(input);

    if bracket_interior_is_blank(line) {
        return Err(RecordDecodeError::Empty);
    }

    match attributes(line) {
        Ok(("", pairs)) => {
            let mut task = Task::new();
            for (name, value) in pairs {
                if task.has(&name) {
                    return Err(RecordDecodeError::DuplicateAttribute(name));
                }
                task.set(name, value);
            }
            Ok(task)
        }
        Ok((_, _)) => Err(RecordDecodeError::TrailingGarbage),
        Err(_) => Err(RecordDecodeError::NotARecord),
    }
}

/// Compose a [`Task`] into its record line, without a trailing newline.
///
/// Attributes with empty values are omitted. Attribute order is the task's
/// insertion order; consumers must not rely on any particular order.
pub fn compose(task: &Task) -> String {
    let mut line = String::from("[");

    let mut first = true;
    for (name, value) in task.iter() {
        if value.is_empty() {
            continue;
        }
        if !first {
            line.push(' ');
        }
        line.push_str(name);
        line.push_str(":\"");
        line.push_str(&escape_value(value));
        line.push('"');
        first = false;
    }

    line.push(']');
    line
}

/// Codec for single-line task records.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RecordCodec;

impl Decoder for RecordCodec {
    type Message = Task;
    type Error = RecordDecodeError;

    fn decode(&self, input: &[u8]) -> Result<Task, RecordDecodeError> {
        let text = std::str::from_utf8(input).map_err(|_| RecordDecodeError::NotUtf8)?;
        parse(text)
    }
}

impl Encoder for RecordCodec {
    type Message = Task;

    fn encode(&self, task: &Task) -> Vec<u8> {
        compose(task).into_bytes()
    }
}
