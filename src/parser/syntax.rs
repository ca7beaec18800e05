//! nom combinators for the DSL
//!
//! ```text
//! document   := trivia (expression trivia)*
//! expression := '(' trivia symbol (trivia argument)* trivia ')'
//! argument   := expression | string | attr-ref | number | boolean | identifier
//! trivia     := (whitespace | ';' comment-to-eol)*
//! ```
//!
//! Every parser receives the `LineIndex` of the whole document so nodes can
//! be stamped with their line/column as they are built.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, none_of, satisfy},
    combinator::{cut, eof, map, opt, peek, recognize, value},
    error::{context, VerboseError},
    multi::many0,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::{NodeKind, SyntaxNode};
use super::diagnostics::LineIndex;

pub(crate) type SyntaxResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

// ============================================================================
// Character classes
// ============================================================================

pub(crate) fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

fn is_attr_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '{' | '}' | ':' | '(' | ')' | '"' | '@')
}

// ============================================================================
// Trivia
// ============================================================================

fn comment(input: &str) -> SyntaxResult<'_, &str> {
    preceded(char(';'), take_while(|c| c != '\n'))(input)
}

/// Whitespace and line comments, both insignificant between tokens.
pub(crate) fn trivia(input: &str) -> SyntaxResult<'_, ()> {
    value((), many0(alt((multispace1, comment))))(input)
}

/// A number or boolean only counts as one when the token ends here.
fn token_end(input: &str) -> SyntaxResult<'_, ()> {
    alt((
        value((), satisfy(|c| c.is_whitespace() || c == ')')),
        value((), eof),
    ))(input)
}

// ============================================================================
// Document and expressions
// ============================================================================

/// Zero or more top-level expressions. Stops at the first byte that cannot
/// start an expression; the caller decides whether leftovers are an error.
pub(crate) fn document<'a>(
    input: &'a str,
    index: &LineIndex<'a>,
) -> SyntaxResult<'a, Vec<SyntaxNode>> {
    let (input, _) = trivia(input)?;
    many0(|i| {
        let (i, expr) = expression(i, index, true)?;
        let (i, _) = trivia(i)?;
        Ok((i, expr))
    })(input)
}

fn expression<'a>(
    input: &'a str,
    index: &LineIndex<'a>,
    top_level: bool,
) -> SyntaxResult<'a, SyntaxNode> {
    let location = index.locate(input);
    let (input, _) = char('(')(input)?;
    let (input, _) = trivia(input)?;

    let head_location = index.locate(input);
    let (input, head) = cut(context("verb", symbol))(input)?;
    let head_kind = if top_level {
        NodeKind::Verb
    } else {
        NodeKind::Identifier
    };

    let (input, arguments) = many0(preceded(trivia, |i| argument(i, index)))(input)?;
    let (input, _) = trivia(input)?;
    let (input, _) = cut(context("closing parenthesis", char(')')))(input)?;

    Ok((
        input,
        SyntaxNode::expression(
            SyntaxNode::leaf(head_kind, head, head_location),
            arguments,
            location,
        ),
    ))
}

/// Expression head: must start with a letter or underscore.
pub(crate) fn symbol(input: &str) -> SyntaxResult<'_, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_symbol_char),
    ))(input)
}

// ============================================================================
// Arguments
// ============================================================================

fn argument<'a>(input: &'a str, index: &LineIndex<'a>) -> SyntaxResult<'a, SyntaxNode> {
    let location = index.locate(input);
    alt((
        |i| expression(i, index, false),
        map(string_literal, move |s| {
            SyntaxNode::leaf(NodeKind::String, s, location)
        }),
        map(attribute_ref, move |(literal, id, name)| {
            SyntaxNode::attribute_ref(literal, id, name, location)
        }),
        map(number, move |n| SyntaxNode::leaf(NodeKind::Number, n, location)),
        map(boolean, move |b| {
            SyntaxNode::leaf(NodeKind::Boolean, b, location)
        }),
        map(take_while1(is_symbol_char), move |s: &str| {
            SyntaxNode::leaf(NodeKind::Identifier, s, location)
        }),
    ))(input)
}

/// Double-quoted string with `\n \t \r \" \\` escapes.
pub(crate) fn string_literal(input: &str) -> SyntaxResult<'_, String> {
    preceded(
        char('"'),
        cut(terminated(
            map(
                opt(escaped_transform(
                    none_of("\"\\"),
                    '\\',
                    alt((
                        value('\n', char('n')),
                        value('\r', char('r')),
                        value('\t', char('t')),
                        value('\\', char('\\')),
                        value('"', char('"')),
                    )),
                )),
                Option::unwrap_or_default,
            ),
            context("closing quote", char('"')),
        )),
    )(input)
}

/// Optional sign, digits, optional fraction; only when followed by whitespace,
/// `)` or end of input. `100x` therefore falls through to an identifier.
pub(crate) fn number(input: &str) -> SyntaxResult<'_, &str> {
    terminated(
        recognize(tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1))))),
        peek(token_end),
    )(input)
}

pub(crate) fn boolean(input: &str) -> SyntaxResult<'_, &str> {
    terminated(alt((tag("true"), tag("false"))), peek(token_end))(input)
}

/// `@attr{id}` or `@attr{id:name}`. Once `@` is seen the reference must be
/// well formed; malformed references are failures, not fall-throughs.
pub(crate) fn attribute_ref(input: &str) -> SyntaxResult<'_, (&str, &str, Option<&str>)> {
    let start = input;
    let (input, _) = char('@')(input)?;
    let (input, _) = cut(context("'attr{' after '@'", tag("attr{")))(input)?;
    let (input, id) = cut(context("attribute id", take_while1(is_attr_char)))(input)?;
    let (input, name) = opt(preceded(
        char(':'),
        cut(context("attribute name", take_while1(is_attr_char))),
    ))(input)?;
    let (input, _) = cut(context("closing brace '}'", char('}')))(input)?;

    let literal = &start[..start.len() - input.len()];
    Ok((input, (literal, id, name)))
}
