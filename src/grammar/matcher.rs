//! Token-level matcher for grammar rules
//!
//! Text is first split into tokens with the parser's own lexical functions,
//! then matched top-down against rule expressions. Choices are ordered and
//! repetition is greedy, so a rule set behaves like a PEG.

use std::collections::HashMap;

use nom::{bytes::complete::take_while1, error::VerboseError};

use super::ebnf::RuleExpression;
use crate::error::{GrammarError, SourceLocation};
use crate::parser::diagnostics::{describe_found, LineIndex};
use crate::parser::syntax::{
    attribute_ref, boolean, is_symbol_char, number, string_literal, trivia,
};

/// Token classes available to rules without a definition
pub const BUILTIN_RULES: [&str; 6] = ["VERB", "IDENTIFIER", "STRING", "NUMBER", "BOOLEAN", "ATTR_REF"];

/// Guard against runaway nesting in the matched text.
const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    Symbol,
    String,
    Number,
    Boolean,
    AttrRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Raw source text, quotes included for strings
    pub text: &'a str,
    pub location: SourceLocation,
}

impl Token<'_> {
    fn describe(&self) -> String {
        format!("'{}'", self.text)
    }
}

/// Split text into tokens using the same conventions as the parser.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, GrammarError> {
    let index = LineIndex::new(input);
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        rest = match trivia(rest) {
            Ok((r, _)) => r,
            Err(_) => rest,
        };
        if rest.is_empty() {
            break;
        }

        let location = index.locate(rest);
        let (next, kind) = lex_one(rest).map_err(|message| GrammarError::Lexical {
            message,
            line: location.line,
            column: location.column,
        })?;

        tokens.push(Token {
            kind,
            text: &rest[..rest.len() - next.len()],
            location,
        });
        rest = next;
    }

    Ok(tokens)
}

fn lex_one(input: &str) -> Result<(&str, TokenKind), String> {
    if let Some(rest) = input.strip_prefix('(') {
        return Ok((rest, TokenKind::Open));
    }
    if let Some(rest) = input.strip_prefix(')') {
        return Ok((rest, TokenKind::Close));
    }
    if input.starts_with('"') {
        return string_literal(input)
            .map(|(rest, _)| (rest, TokenKind::String))
            .map_err(|_| "unterminated string".to_string());
    }
    if input.starts_with('@') {
        return attribute_ref(input)
            .map(|(rest, _)| (rest, TokenKind::AttrRef))
            .map_err(|_| "malformed attribute reference".to_string());
    }
    if let Ok((rest, _)) = number(input) {
        return Ok((rest, TokenKind::Number));
    }
    if let Ok((rest, _)) = boolean(input) {
        return Ok((rest, TokenKind::Boolean));
    }
    take_while1::<_, _, VerboseError<&str>>(is_symbol_char)(input)
        .map(|(rest, _)| (rest, TokenKind::Symbol))
        .map_err(|_| format!("unexpected character {}", describe_found(input)))
}

/// `domain.action`: a symbol starting with a letter and containing a dot
fn is_verb(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_alphabetic())
        && text.contains('.')
        && !text.starts_with('.')
        && !text.ends_with('.')
}

/// Furthest point any terminal failed, with the first failure seen there
/// for each rule.
#[derive(Debug, Default)]
struct Furthest {
    position: usize,
    failures: Vec<(String, String)>,
}

pub(crate) struct Matcher<'r, 't> {
    rules: &'r HashMap<String, &'r RuleExpression>,
    tokens: &'t [Token<'t>],
    end_location: SourceLocation,
    furthest: Furthest,
    depth: usize,
}

impl<'r, 't> Matcher<'r, 't> {
    pub(crate) fn new(
        rules: &'r HashMap<String, &'r RuleExpression>,
        tokens: &'t [Token<'t>],
        end_location: SourceLocation,
    ) -> Self {
        Self {
            rules,
            tokens,
            end_location,
            furthest: Furthest::default(),
            depth: 0,
        }
    }

    /// Match `root` against the whole token stream.
    pub(crate) fn run(mut self, root: &str) -> Result<(), Vec<GrammarError>> {
        let Some(expr) = self.rules.get(root).copied() else {
            return Err(vec![GrammarError::RuleNotFound {
                rule: root.to_string(),
            }]);
        };

        let stopped = self.match_expr(expr, 0, root);
        match stopped {
            Some(pos) if pos == self.tokens.len() => Ok(()),
            Some(pos) if self.furthest.position <= pos => {
                let token = &self.tokens[pos];
                Err(vec![GrammarError::TrailingInput {
                    found: token.describe(),
                    line: token.location.line,
                    column: token.location.column,
                }])
            }
            _ => Err(self.mismatches()),
        }
    }

    fn mismatches(&self) -> Vec<GrammarError> {
        let (found, location) = match self.tokens.get(self.furthest.position) {
            Some(token) => (token.describe(), token.location),
            None => ("end of input".to_string(), self.end_location),
        };
        self.furthest
            .failures
            .iter()
            .map(|(rule, expected)| GrammarError::Mismatch {
                rule: rule.clone(),
                expected: expected.clone(),
                found: found.clone(),
                line: location.line,
                column: location.column,
            })
            .collect()
    }

    fn fail(&mut self, pos: usize, rule: &str, expected: String) -> Option<usize> {
        if pos > self.furthest.position {
            self.furthest.position = pos;
            self.furthest.failures.clear();
        }
        if pos == self.furthest.position && !self.furthest.failures.iter().any(|(r, _)| r == rule) {
            self.furthest.failures.push((rule.to_string(), expected));
        }
        None
    }

    fn match_expr(&mut self, expr: &RuleExpression, pos: usize, rule: &str) -> Option<usize> {
        match expr {
            RuleExpression::Terminal(text) => match self.tokens.get(pos) {
                Some(token) if token.text == text.as_str() => Some(pos + 1),
                _ => self.fail(pos, rule, format!("\"{}\"", text)),
            },
            RuleExpression::NonTerminal(name) => self.match_rule(name, pos, rule),
            RuleExpression::Sequence(exprs) => {
                let mut at = pos;
                for e in exprs {
                    at = self.match_expr(e, at, rule)?;
                }
                Some(at)
            }
            RuleExpression::Choice(exprs) => exprs
                .iter()
                .find_map(|e| self.match_expr(e, pos, rule)),
            RuleExpression::Group(e) => self.match_expr(e, pos, rule),
            RuleExpression::Optional(e) => Some(self.match_expr(e, pos, rule).unwrap_or(pos)),
            RuleExpression::ZeroOrMore(e) => Some(self.repeat(e, pos, rule)),
            RuleExpression::OneOrMore(e) => {
                let first = self.match_expr(e, pos, rule)?;
                Some(self.repeat(e, first, rule))
            }
        }
    }

    fn repeat(&mut self, expr: &RuleExpression, mut pos: usize, rule: &str) -> usize {
        while let Some(next) = self.match_expr(expr, pos, rule) {
            if next == pos {
                break;
            }
            pos = next;
        }
        pos
    }

    fn match_rule(&mut self, name: &str, pos: usize, caller: &str) -> Option<usize> {
        if let Some(expr) = self.rules.get(name).copied() {
            if self.depth >= MAX_DEPTH {
                return self.fail(pos, name, "nesting within depth limit".to_string());
            }
            self.depth += 1;
            let result = self.match_expr(expr, pos, name);
            self.depth -= 1;
            return result;
        }

        let token = self.tokens.get(pos);
        let matched = match (name, token) {
            ("VERB", Some(t)) => t.kind == TokenKind::Symbol && is_verb(t.text),
            ("IDENTIFIER", Some(t)) => t.kind == TokenKind::Symbol,
            ("STRING", Some(t)) => t.kind == TokenKind::String,
            ("NUMBER", Some(t)) => t.kind == TokenKind::Number,
            ("BOOLEAN", Some(t)) => t.kind == TokenKind::Boolean,
            ("ATTR_REF", Some(t)) => t.kind == TokenKind::AttrRef,
            _ => false,
        };

        if matched {
            Some(pos + 1)
        } else {
            self.fail(pos, caller, name.to_string())
        }
    }
}
