//! Argument checks and text diagnostics for domain vocabularies

use tracing::debug;

use super::{ArgType, ArgumentSpec, DomainVocabulary, VerbDefinition};
use crate::error::{VocabularyError, VocabularyResult};
use crate::parser::{NodeKind, SyntaxNode, SyntaxTree};

impl DomainVocabulary {
    /// Check the named arguments of every top-level verb against its
    /// `ArgumentSpec`s. Unknown verbs are skipped; `validate_verbs` reports
    /// them.
    pub fn validate_arguments(&self, tree: &SyntaxTree) -> VocabularyResult<()> {
        for expr in tree.expressions() {
            if let Some(definition) = self.verb(expr.value()) {
                validate_expression(definition, expr)?;
            }
        }
        Ok(())
    }

    /// Best-effort guess of the state a document has reached, from the last
    /// transition verb that appears in the raw text. Diagnostic only; the
    /// declared transitions are what sessions actually track.
    pub fn infer_state_from_text(&self, text: &str) -> Option<String> {
        self.verbs()
            .filter_map(|verb| {
                let transition = verb.transition.as_ref()?;
                let at = text.rfind(&format!("({}", verb.name))?;
                Some((at, transition.to_state.clone()))
            })
            .max_by_key(|(at, _)| *at)
            .map(|(_, state)| state)
    }
}

fn validate_expression(definition: &VerbDefinition, expr: &SyntaxNode) -> VocabularyResult<()> {
    for spec in definition.required_arguments() {
        if expr.named_argument(&spec.name).is_none() {
            debug!(verb = %definition.name, argument = %spec.name, "required argument missing");
            return Err(VocabularyError::MissingArgument {
                verb: definition.name.clone(),
                argument: spec.name.clone(),
            });
        }
    }

    for spec in definition.arguments.values() {
        let Some(arg) = expr.named_argument(&spec.name) else {
            continue;
        };
        let invalid = |reason: String| VocabularyError::InvalidArgument {
            verb: definition.name.clone(),
            argument: spec.name.clone(),
            reason,
        };
        let Some(value) = arg.arguments().first() else {
            return Err(invalid("no value given".to_string()));
        };
        check_value(spec, value).map_err(invalid)?;
    }

    Ok(())
}

fn check_value(spec: &ArgumentSpec, value: &SyntaxNode) -> Result<(), String> {
    let is_text = matches!(value.kind(), NodeKind::String | NodeKind::Identifier);

    match spec.arg_type {
        ArgType::Any => {}
        ArgType::String if !is_text => {
            return Err(format!("expected a string, found {:?}", value.kind()));
        }
        ArgType::String => {}
        ArgType::Number => {
            if !value.is(NodeKind::Number) {
                return Err(format!("expected a number, found {:?}", value.kind()));
            }
            let n: f64 = value
                .value()
                .parse()
                .map_err(|_| format!("'{}' is not a number", value.value()))?;
            if let Some(min) = spec.min {
                if n < min {
                    return Err(format!("{} is below the minimum {}", n, min));
                }
            }
            if let Some(max) = spec.max {
                if n > max {
                    return Err(format!("{} is above the maximum {}", n, max));
                }
            }
        }
        ArgType::Boolean if !value.is(NodeKind::Boolean) => {
            return Err(format!("expected true or false, found {:?}", value.kind()));
        }
        ArgType::Boolean => {}
        ArgType::Uuid => {
            if !is_text || uuid::Uuid::parse_str(value.value()).is_err() {
                return Err(format!("'{}' is not a UUID", value.value()));
            }
        }
        ArgType::Enum => {
            if !is_text || !spec.enum_values.iter().any(|v| v == value.value()) {
                return Err(format!(
                    "'{}' is not one of [{}]",
                    value.value(),
                    spec.enum_values.join(", ")
                ));
            }
        }
        ArgType::AttributeRef => {
            let legacy = value.is(NodeKind::Expression) && value.value() == "attr-id";
            if !value.is(NodeKind::AttributeRef) && !legacy {
                return Err("expected an attribute reference".to_string());
            }
        }
    }

    if let Some(pattern) = &spec.pattern {
        let re = pattern
            .regex()
            .ok_or_else(|| format!("invalid pattern '{}'", pattern.as_str()))?;
        if !re.is_match(value.value()) {
            return Err(format!("'{}' does not match {}", value.value(), pattern.as_str()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::vocabulary::DomainStateMachine;

    fn vocabulary() -> DomainVocabulary {
        let machine = DomainStateMachine::new(
            "onboarding",
            ["CREATE", "PRODUCTS_ADDED"],
            "CREATE",
            [("CREATE", vec!["PRODUCTS_ADDED"])],
        )
        .unwrap();
        DomainVocabulary::new(
            "onboarding",
            vec![
                VerbDefinition::new("case.create", "case", "Create a case")
                    .with_argument(
                        ArgumentSpec::new("cbu.id", ArgType::String)
                            .required()
                            .with_pattern(r"^CBU-[A-Z0-9]+$"),
                    )
                    .with_argument(ArgumentSpec::new("nature-purpose", ArgType::String).required())
                    .with_argument(ArgumentSpec::new("headcount", ArgType::Number).with_range(Some(1.0), Some(100.0)))
                    .with_argument(
                        ArgumentSpec::new("type", ArgType::String)
                            .with_enum(["CORPORATE", "TRUST"]),
                    )
                    .with_argument(ArgumentSpec::new("owner", ArgType::Uuid))
                    .with_transition(Vec::<String>::new(), "CREATE"),
                VerbDefinition::new("products.add", "products", "Add products")
                    .with_transition(["CREATE"], "PRODUCTS_ADDED"),
            ],
            machine,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_arguments() {
        let v = vocabulary();
        let tree = parse(
            r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Test") (headcount 10) (type "TRUST")
                (owner "123e4567-e89b-12d3-a456-426614174000"))"#,
        )
        .unwrap();
        assert!(v.validate_arguments(&tree).is_ok());
    }

    #[test]
    fn test_missing_required_argument() {
        let v = vocabulary();
        let tree = parse(r#"(case.create (cbu.id "CBU-1234"))"#).unwrap();
        assert_eq!(
            v.validate_arguments(&tree).unwrap_err(),
            VocabularyError::MissingArgument {
                verb: "case.create".to_string(),
                argument: "nature-purpose".to_string(),
            }
        );
    }

    #[test]
    fn test_argument_constraints() {
        let v = vocabulary();
        for bad in [
            r#"(case.create (cbu.id "cbu-lower") (nature-purpose "x"))"#,
            r#"(case.create (cbu.id "CBU-1") (nature-purpose "x") (headcount 500))"#,
            r#"(case.create (cbu.id "CBU-1") (nature-purpose "x") (headcount "ten"))"#,
            r#"(case.create (cbu.id "CBU-1") (nature-purpose "x") (type "FUND"))"#,
            r#"(case.create (cbu.id "CBU-1") (nature-purpose "x") (owner "not-a-uuid"))"#,
            r#"(case.create (cbu.id) (nature-purpose "x"))"#,
        ] {
            let tree = parse(bad).unwrap();
            assert!(
                matches!(
                    v.validate_arguments(&tree),
                    Err(VocabularyError::InvalidArgument { .. })
                ),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_infer_state_from_text_uses_last_transition_verb() {
        let v = vocabulary();
        assert_eq!(
            v.infer_state_from_text("(case.create (cbu.id \"CBU-1\"))\n\n(products.add \"X\")"),
            Some("PRODUCTS_ADDED".to_string())
        );
        assert_eq!(v.infer_state_from_text("(case.create)"), Some("CREATE".to_string()));
        assert_eq!(v.infer_state_from_text(""), None);
    }
}
