use winnow::combinator::{alt, delimited, repeat};
use winnow::token::{take_till, take_while};
use winnow::{ModalResult, Parser};

use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn variable<'a>(input: &mut &'a str) -> ModalResult<Segment<'a>> {
    delimited(
        '%',
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_'),
        '%',
    )
    .map(Segment::Variable)
    .parse_next(input)
}

fn literal<'a>(input: &mut &'a str) -> ModalResult<Segment<'a>> {
    alt((take_till(1.., '%'), "%"))
        .map(Segment::Literal)
        .parse_next(input)
}

fn segments<'a>(input: &mut &'a str) -> ModalResult<Vec<Segment<'a>>> {
    repeat(0.., alt((variable, literal))).parse_next(input)
}

/// Replaces `%name%` placeholders with variable values.
///
/// Unset and null variables render as empty text; a `%` that does not
/// open a placeholder is kept as is.
pub fn interpolate<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Value,
{
    if !text.contains('%') {
        return text.to_string();
    }

    let mut input = text;
    let Ok(parts) = segments(&mut input) else {
        return text.to_string();
    };

    let mut out = String::with_capacity(text.len());
    for part in parts {
        match part {
            Segment::Literal(s) => out.push_str(s),
            Segment::Variable(name) => match lookup(name) {
                Value::Null => {}
                value => out.push_str(&value.to_string()),
            },
        }
    }
    out.push_str(input);
    out
}
