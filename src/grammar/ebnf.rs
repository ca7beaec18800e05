//! Rule notation parser using nom combinators
//!
//! Rules are written one per production:
//!
//! ```text
//! # comment
//! dsl_document -> expression*
//! expression   -> "(" VERB argument* ")"
//! argument     -> expression | STRING | NUMBER | ( "[" IDENTIFIER+ "]" )?
//! ```
//!
//! A trailing `;` is accepted but optional. A rule body ends where the next
//! `name ->` begins.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{alpha1, alphanumeric1, char, multispace1, one_of},
    combinator::{all_consuming, cut, map, not, opt, recognize, value},
    error::{context, VerboseError},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish, IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GrammarError;
use crate::parser::diagnostics::{convert_error, LineIndex};

pub type RuleParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Right-hand side of a production - recursive structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleExpression {
    /// Literal token text: "(" or 'case.create'
    Terminal(String),
    /// Reference to another rule or a built-in token class
    NonTerminal(String),
    /// A B C
    Sequence(Vec<RuleExpression>),
    /// A | B | C
    Choice(Vec<RuleExpression>),
    /// A?
    Optional(Box<RuleExpression>),
    /// A*
    ZeroOrMore(Box<RuleExpression>),
    /// A+
    OneOrMore(Box<RuleExpression>),
    /// ( A B | C )
    Group(Box<RuleExpression>),
}

impl RuleExpression {
    /// Names of every rule referenced anywhere in the expression.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            RuleExpression::NonTerminal(name) => out.push(name),
            RuleExpression::Sequence(exprs) | RuleExpression::Choice(exprs) => {
                for e in exprs {
                    e.collect_references(out);
                }
            }
            RuleExpression::Optional(e)
            | RuleExpression::ZeroOrMore(e)
            | RuleExpression::OneOrMore(e)
            | RuleExpression::Group(e) => e.collect_references(out),
            RuleExpression::Terminal(_) => {}
        }
    }

    /// Whether the expression can succeed without consuming a token,
    /// judged on syntax alone.
    pub fn is_nullable(&self) -> bool {
        match self {
            RuleExpression::Optional(_) | RuleExpression::ZeroOrMore(_) => true,
            RuleExpression::Terminal(_) | RuleExpression::NonTerminal(_) => false,
            RuleExpression::Sequence(exprs) => exprs.iter().all(RuleExpression::is_nullable),
            RuleExpression::Choice(exprs) => exprs.iter().any(RuleExpression::is_nullable),
            RuleExpression::OneOrMore(e) | RuleExpression::Group(e) => e.is_nullable(),
        }
    }

    /// Rules that may be entered before any token is consumed. A cycle over
    /// this relation is left recursion, which a top-down matcher cannot run.
    pub fn leftmost_references(&self) -> Vec<&str> {
        match self {
            RuleExpression::NonTerminal(name) => vec![name.as_str()],
            RuleExpression::Terminal(_) => Vec::new(),
            RuleExpression::Sequence(exprs) => {
                let mut out = Vec::new();
                for e in exprs {
                    out.extend(e.leftmost_references());
                    if !e.is_nullable() {
                        break;
                    }
                }
                out
            }
            RuleExpression::Choice(exprs) => exprs
                .iter()
                .flat_map(RuleExpression::leftmost_references)
                .collect(),
            RuleExpression::Optional(e)
            | RuleExpression::ZeroOrMore(e)
            | RuleExpression::OneOrMore(e)
            | RuleExpression::Group(e) => e.leftmost_references(),
        }
    }
}

impl fmt::Display for RuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleExpression::Terminal(t) if t.contains('"') => write!(f, "'{}'", t),
            RuleExpression::Terminal(t) => write!(f, "\"{}\"", t),
            RuleExpression::NonTerminal(n) => write!(f, "{}", n),
            RuleExpression::Sequence(exprs) => {
                let parts: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
            RuleExpression::Choice(exprs) => {
                let parts: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
            RuleExpression::Optional(e) => write!(f, "{}?", e),
            RuleExpression::ZeroOrMore(e) => write!(f, "{}*", e),
            RuleExpression::OneOrMore(e) => write!(f, "{}+", e),
            RuleExpression::Group(e) => write!(f, "({})", e),
        }
    }
}

/// A parsed production, before it is scoped to a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub name: String,
    pub expression: RuleExpression,
}

/// Parse a block of rule definitions.
pub fn parse_rules(input: &str) -> Result<Vec<ParsedRule>, GrammarError> {
    let index = LineIndex::new(input);
    let (_, rules) = all_consuming(rules)(input).finish().map_err(|e| {
        let err = convert_error(&index, &e);
        GrammarError::InvalidRule {
            reason: err.to_string(),
        }
    })?;
    Ok(rules)
}

/// Parse a single rule body such as `"(" VERB argument* ")"`.
pub fn parse_expression(input: &str) -> Result<RuleExpression, GrammarError> {
    let index = LineIndex::new(input);
    let (_, expr) = all_consuming(delimited(ws, choice, ws))(input)
        .finish()
        .map_err(|e| GrammarError::InvalidRule {
            reason: convert_error(&index, &e).to_string(),
        })?;
    Ok(expr)
}

// Standalone parser functions

/// Whitespace and `#` comments
fn ws(input: &str) -> RuleParseResult<'_, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            preceded(char('#'), take_while(|c| c != '\n')),
        ))),
    )(input)
}

fn rules(input: &str) -> RuleParseResult<'_, Vec<ParsedRule>> {
    preceded(ws, many0(terminated(rule, ws)))(input)
}

/// rule_name -> expression [;]
fn rule(input: &str) -> RuleParseResult<'_, ParsedRule> {
    context(
        "rule",
        map(
            tuple((
                terminated(identifier, tuple((ws, tag("->"), ws))),
                cut(context("rule body", choice)),
                opt(preceded(ws, char(';'))),
            )),
            |(name, expression, _)| ParsedRule {
                name: name.to_string(),
                expression,
            },
        ),
    )(input)
}

/// A | B | C
fn choice(input: &str) -> RuleParseResult<'_, RuleExpression> {
    map(
        separated_list1(terminated(char('|'), ws), sequence),
        |mut choices| {
            if choices.len() == 1 {
                choices.remove(0)
            } else {
                RuleExpression::Choice(choices)
            }
        },
    )(input)
}

/// A B C
fn sequence(input: &str) -> RuleParseResult<'_, RuleExpression> {
    map(many1(terminated(postfix, ws)), |mut terms| {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            RuleExpression::Sequence(terms)
        }
    })(input)
}

/// Postfix operators: ?, *, +
fn postfix(input: &str) -> RuleParseResult<'_, RuleExpression> {
    map(pair(primary, opt(one_of("?*+"))), |(expr, op)| match op {
        Some('?') => RuleExpression::Optional(Box::new(expr)),
        Some('*') => RuleExpression::ZeroOrMore(Box::new(expr)),
        Some('+') => RuleExpression::OneOrMore(Box::new(expr)),
        _ => expr,
    })(input)
}

fn primary(input: &str) -> RuleParseResult<'_, RuleExpression> {
    alt((terminal, group, non_terminal))(input)
}

/// ( expression )
fn group(input: &str) -> RuleParseResult<'_, RuleExpression> {
    map(
        delimited(
            terminated(char('('), ws),
            choice,
            cut(context("closing ')' of group", char(')'))),
        ),
        |expr| RuleExpression::Group(Box::new(expr)),
    )(input)
}

/// "text" or 'text'
fn terminal(input: &str) -> RuleParseResult<'_, RuleExpression> {
    map(
        alt((
            delimited(char('"'), take_until("\""), char('"')),
            delimited(char('\''), take_until("'"), char('\'')),
        )),
        |s: &str| RuleExpression::Terminal(s.to_string()),
    )(input)
}

/// A rule reference; an identifier that starts the next production is not one.
fn non_terminal(input: &str) -> RuleParseResult<'_, RuleExpression> {
    map(
        terminated(identifier, not(tuple((ws, tag("->"))))),
        |s: &str| RuleExpression::NonTerminal(s.to_string()),
    )(input)
}

/// letter (letter | digit | '_')*
fn identifier(input: &str) -> RuleParseResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules_without_terminators() {
        let rules = parse_rules(
            r#"
            # document
            dsl_document -> expression*
            expression -> "(" VERB argument* ")"
            argument -> expression | STRING | NUMBER
            "#,
        )
        .unwrap();

        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].name, "dsl_document");
        assert_eq!(
            rules[0].expression,
            RuleExpression::ZeroOrMore(Box::new(RuleExpression::NonTerminal(
                "expression".to_string()
            )))
        );
        assert!(matches!(rules[2].expression, RuleExpression::Choice(ref c) if c.len() == 3));
    }

    #[test]
    fn test_parse_rules_with_semicolons_and_groups() {
        let rules = parse_rules(r#"list -> "[" (item ("," item)*)? "]" ; item -> NUMBER ;"#).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules[0].expression.to_string(),
            r#""[" (item ("," item)*)? "]""#
        );
    }

    #[test]
    fn test_single_quoted_terminal() {
        let expr = parse_expression(r#"'"' IDENTIFIER"#).unwrap();
        assert_eq!(
            expr,
            RuleExpression::Sequence(vec![
                RuleExpression::Terminal("\"".to_string()),
                RuleExpression::NonTerminal("IDENTIFIER".to_string()),
            ])
        );
    }

    #[test]
    fn test_invalid_rule_reports_position() {
        let err = parse_rules("a -> ").unwrap_err();
        match err {
            GrammarError::InvalidRule { reason } => assert!(reason.contains("line 1")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_leftmost_references_skip_nullable_prefix() {
        let expr = parse_expression(r#"opt? "x" | other tail"#).unwrap();
        let mut refs = expr.leftmost_references();
        refs.sort();
        assert_eq!(refs, vec!["opt", "other"]);
    }
}
