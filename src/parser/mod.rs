//! DSL parser
//!
//! Turns source text into a [`SyntaxTree`]. The grammar is shared by every
//! domain; the parser never checks whether a verb exists or how many
//! arguments it takes. That belongs to [`crate::vocabulary`].
//!
//! ```rust
//! use ob_poc_dsl::parser::parse;
//!
//! let tree = parse(r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Test"))"#).unwrap();
//! assert_eq!(tree.verbs(), vec!["case.create".to_string()]);
//! ```

pub mod ast;
pub mod diagnostics;
pub(crate) mod syntax;

pub use ast::{AttributeRef, Descendants, NodeKind, SyntaxNode, SyntaxTree};
pub use diagnostics::byte_to_line_col;

use tracing::debug;

use crate::error::{ParseError, ParseResult};
use diagnostics::{convert_error, LineIndex};

/// Parse a complete document.
pub fn parse(input: &str) -> ParseResult<SyntaxTree> {
    let index = LineIndex::new(input);

    let (rest, expressions) = match syntax::document(input, &index) {
        Ok(parsed) => parsed,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let err = convert_error(&index, &e);
            debug!(line = err.line, column = err.column, "parse failed: {}", err.message);
            return Err(err);
        }
        Err(nom::Err::Incomplete(_)) => {
            let loc = index.location(input.len());
            return Err(ParseError::new(loc.line, loc.column, "incomplete input"));
        }
    };

    if !rest.is_empty() {
        let loc = index.locate(rest);
        let message = if rest.starts_with(')') {
            "unbalanced closing parenthesis".to_string()
        } else {
            format!(
                "expected '(' to start an expression, found {}",
                diagnostics::describe_found(rest)
            )
        };
        debug!(line = loc.line, column = loc.column, "parse failed: {}", message);
        return Err(ParseError::new(loc.line, loc.column, message));
    }

    Ok(SyntaxTree::new(expressions))
}

/// Parse and return every distinct attribute id referenced by the text.
pub fn extract_attribute_ids(input: &str) -> ParseResult<Vec<String>> {
    Ok(parse(input)?.attribute_ids())
}

/// Parse and return `(id, name)` pairs for every distinct attribute.
pub fn extract_attributes(input: &str) -> ParseResult<Vec<(String, Option<String>)>> {
    Ok(parse(input)?.attributes())
}

/// Parse and return the verbs used by the text, first occurrence first.
pub fn extract_verbs(input: &str) -> ParseResult<Vec<String>> {
    Ok(parse(input)?.verbs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_expression() {
        let tree = parse(r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Test"))"#).unwrap();
        assert_eq!(tree.expressions().len(), 1);

        let expr = &tree.expressions()[0];
        assert_eq!(expr.kind(), NodeKind::Expression);
        assert_eq!(expr.value(), "case.create");
        assert_eq!(expr.children()[0].kind(), NodeKind::Verb);
        assert_eq!(expr.children().len(), 3);

        let cbu = expr.named_argument("cbu.id").unwrap();
        assert_eq!(cbu.children()[0].kind(), NodeKind::Identifier);
        assert_eq!(cbu.children()[0].value(), "cbu.id");
        assert_eq!(cbu.arguments()[0].value(), "CBU-1234");
    }

    #[test]
    fn test_parse_empty_and_comment_only() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  ; just a comment\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_number_keeps_source_text() {
        let tree = parse("(x.y 100.50 -123.45 7)").unwrap();
        let args = tree.expressions()[0].arguments();
        let values: Vec<(&str, NodeKind)> = args.iter().map(|n| (n.value(), n.kind())).collect();
        assert_eq!(
            values,
            vec![
                ("100.50", NodeKind::Number),
                ("-123.45", NodeKind::Number),
                ("7", NodeKind::Number),
            ]
        );
    }

    #[test]
    fn test_number_followed_by_letters_is_identifier() {
        let tree = parse("(x.y 100x 100)").unwrap();
        let args = tree.expressions()[0].arguments();
        assert_eq!(args[0].kind(), NodeKind::Identifier);
        assert_eq!(args[0].value(), "100x");
        assert_eq!(args[1].kind(), NodeKind::Number);
    }

    #[test]
    fn test_booleans_and_identifiers() {
        let tree = parse("(x.y true false truthy some-ident_1.v2)").unwrap();
        let kinds: Vec<NodeKind> = tree.expressions()[0]
            .arguments()
            .iter()
            .map(|n| n.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Boolean,
                NodeKind::Boolean,
                NodeKind::Identifier,
                NodeKind::Identifier
            ]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let tree = parse("; header\n  (kyc.start\n    \"x\")").unwrap();
        let expr = &tree.expressions()[0];
        assert_eq!((expr.line(), expr.column()), (2, 3));
        let arg = &expr.arguments()[0];
        assert_eq!((arg.line(), arg.column()), (3, 5));
    }

    #[test]
    fn test_unclosed_paren_reports_end_position() {
        let err = parse("(case.create (cbu.id \"X\")").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 26);
        assert!(err.message.contains("closing parenthesis"));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse("(case.create \"abc").unwrap_err();
        assert!(err.message.contains("closing quote"), "{}", err.message);
    }

    #[test]
    fn test_extra_closing_paren() {
        let err = parse("(case.create \"x\"))").unwrap_err();
        assert_eq!(err.column, 18);
        assert!(err.message.contains("unbalanced closing parenthesis"));
    }

    #[test]
    fn test_missing_open_paren() {
        let err = parse("case.create)").unwrap_err();
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_missing_verb() {
        let err = parse("(\"no verb\")").unwrap_err();
        assert!(err.message.contains("verb"));
    }

    #[test]
    fn test_attribute_reference_node() {
        let tree = parse("(attributes.define @attr{123e4567:onboard.nature_purpose})").unwrap();
        let attr = &tree.expressions()[0].arguments()[0];
        assert_eq!(attr.kind(), NodeKind::AttributeRef);
        assert_eq!(attr.value(), "@attr{123e4567:onboard.nature_purpose}");
        let r = attr.attribute().unwrap();
        assert_eq!(r.id, "123e4567");
        assert_eq!(r.name.as_deref(), Some("onboard.nature_purpose"));
    }

    #[test]
    fn test_malformed_attribute_is_parse_error() {
        for bad in [
            "(a.b @{uuid})",
            "(a.b @attr uuid)",
            "(a.b @attr{uuid)",
            "(a.b @attr{})",
            "(a.b @attr{uuid:})",
        ] {
            assert!(parse(bad).is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_extract_helpers() {
        let text = r#"(values.bind (bind @attr{a1:x}) (var (attr-id "a2")))"#;
        assert_eq!(extract_attribute_ids(text).unwrap(), vec!["a1", "a2"]);
        assert_eq!(
            extract_attributes(text).unwrap(),
            vec![("a1".to_string(), Some("x".to_string())), ("a2".to_string(), None)]
        );
        assert_eq!(extract_verbs(text).unwrap(), vec!["values.bind"]);
    }
}
