//! Domain vocabularies
//!
//! A vocabulary is the closed set of verbs a domain accepts, each with its
//! argument shape and the state transition it causes, plus the domain's
//! state machine. Vocabularies are built once and never mutated.
//!
//! ## Verb Naming Convention
//!
//! Verbs follow the domain-prefixed format `domain.action`, e.g.
//! `case.create`, `kyc.collect`, `ubo.resolve-ubos`.

pub mod state_machine;
pub mod validator;

pub use state_machine::DomainStateMachine;

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TransitionError, TransitionResult, VocabularyError, VocabularyResult};
use crate::parser::{NodeKind, SyntaxTree};

/// Type tag for a verb argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    String,
    Number,
    Boolean,
    Uuid,
    Enum,
    AttributeRef,
    Any,
}

/// Regex an argument value must match, compiled once when the spec is
/// built. A pattern that does not compile is reported by
/// [`DomainVocabulary::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct ArgumentPattern {
    source: String,
    compiled: Result<Regex, regex::Error>,
}

impl ArgumentPattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source);
        Self { source, compiled }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.compiled.as_ref().ok()
    }

    pub fn error(&self) -> Option<&regex::Error> {
        self.compiled.as_ref().err()
    }
}

impl PartialEq for ArgumentPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<String> for ArgumentPattern {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl From<ArgumentPattern> for String {
    fn from(pattern: ArgumentPattern) -> Self {
        pattern.source
    }
}

/// Shape of one named argument, e.g. `(cbu.id "CBU-1234")`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    pub arg_type: ArgType,
    pub required: bool,
    pub description: Option<String>,
    pub pattern: Option<ArgumentPattern>,
    pub enum_values: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, arg_type: ArgType) -> Self {
        Self {
            name: name.into(),
            arg_type,
            required: false,
            description: None,
            pattern: None,
            enum_values: Vec::new(),
            min: None,
            max: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(ArgumentPattern::new(pattern));
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_type = ArgType::Enum;
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// State change a verb causes. An empty `from_states` marks a verb that
/// starts the domain's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_states: BTreeSet<String>,
    pub to_state: String,
}

impl StateTransition {
    pub fn new<I, S>(from_states: I, to_state: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from_states: from_states.into_iter().map(Into::into).collect(),
            to_state: to_state.into(),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.from_states.is_empty()
    }
}

/// Definition of a DSL verb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerbDefinition {
    pub name: String,
    pub category: String,
    pub description: String,
    pub arguments: BTreeMap<String, ArgumentSpec>,
    pub transition: Option<StateTransition>,
    pub idempotent: bool,
    pub examples: Vec<String>,
}

impl VerbDefinition {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            description: description.into(),
            arguments: BTreeMap::new(),
            transition: None,
            idempotent: false,
            examples: Vec::new(),
        }
    }

    pub fn with_argument(mut self, spec: ArgumentSpec) -> Self {
        self.arguments.insert(spec.name.clone(), spec);
        self
    }

    pub fn with_transition<I, S>(mut self, from_states: I, to_state: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transition = Some(StateTransition::new(from_states, to_state));
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn required_arguments(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.arguments.values().filter(|a| a.required)
    }
}

/// Validate verb format: must be `domain.action` with alphanumeric or
/// hyphenated parts.
pub fn validate_verb_format(verb: &str) -> VocabularyResult<(String, String)> {
    let Some((domain, action)) = verb.split_once('.') else {
        return Err(VocabularyError::InvalidVerbFormat {
            verb: verb.to_string(),
            expected: "domain.action format".to_string(),
        });
    };

    let valid_part = |part: &str| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !valid_part(domain) {
        return Err(VocabularyError::InvalidVerbFormat {
            verb: verb.to_string(),
            expected: "alphanumeric domain with hyphens".to_string(),
        });
    }
    // `cbu.id`-style dotted actions are allowed after the first dot
    if !action.split('.').all(valid_part) {
        return Err(VocabularyError::InvalidVerbFormat {
            verb: verb.to_string(),
            expected: "alphanumeric action with hyphens".to_string(),
        });
    }

    Ok((domain.to_string(), action.to_string()))
}

/// Immutable verb set plus state machine for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainVocabulary {
    domain: String,
    verbs: BTreeMap<String, VerbDefinition>,
    state_machine: DomainStateMachine,
}

impl DomainVocabulary {
    /// Build a vocabulary. Verb names must be well formed and unique, every
    /// state a verb mentions must be declared by the machine, and every
    /// argument pattern must compile.
    pub fn new(
        domain: impl Into<String>,
        verbs: Vec<VerbDefinition>,
        state_machine: DomainStateMachine,
    ) -> VocabularyResult<Self> {
        let domain = domain.into();
        let mut registered = BTreeMap::new();

        for verb in verbs {
            validate_verb_format(&verb.name)?;

            if let Some(transition) = &verb.transition {
                for state in transition.from_states.iter().chain([&transition.to_state]) {
                    if !state_machine.has_state(state) {
                        return Err(VocabularyError::InvalidState {
                            state: state.clone(),
                            domain: domain.clone(),
                        });
                    }
                }
            }

            for spec in verb.arguments.values() {
                if let Some(e) = spec.pattern.as_ref().and_then(ArgumentPattern::error) {
                    return Err(VocabularyError::InvalidPattern {
                        verb: verb.name.clone(),
                        argument: spec.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            if registered.contains_key(&verb.name) {
                return Err(VocabularyError::DuplicateVerb {
                    verb: verb.name,
                    domain,
                });
            }
            registered.insert(verb.name.clone(), verb);
        }

        Ok(Self {
            domain,
            verbs: registered,
            state_machine,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn state_machine(&self) -> &DomainStateMachine {
        &self.state_machine
    }

    pub fn verb(&self, name: &str) -> Option<&VerbDefinition> {
        self.verbs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.verbs.contains_key(name)
    }

    pub fn verbs(&self) -> impl Iterator<Item = &VerbDefinition> {
        self.verbs.values()
    }

    pub fn verb_names(&self) -> Vec<&str> {
        self.verbs.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }

    /// Reject the whole tree on the first verb this domain does not know.
    pub fn validate_verbs(&self, tree: &SyntaxTree) -> VocabularyResult<()> {
        match tree.verb_nodes().find(|n| !self.contains(n.value())) {
            Some(node) => {
                debug!(
                    domain = %self.domain,
                    verb = node.value(),
                    line = node.line(),
                    "unknown verb rejected"
                );
                Err(VocabularyError::UnknownVerb {
                    verb: node.value().to_string(),
                    domain: self.domain.clone(),
                })
            }
            None => Ok(()),
        }
    }

    /// State after applying `verb` in `current`. Verbs without a declared
    /// transition leave the state as it is.
    pub fn apply_verb(&self, current: Option<&str>, verb: &str) -> TransitionResult<Option<String>> {
        let Some(transition) = self.verb(verb).and_then(|v| v.transition.as_ref()) else {
            return Ok(current.map(str::to_string));
        };

        if transition.is_initial() {
            return match current {
                None => Ok(Some(transition.to_state.clone())),
                Some(state) => Err(TransitionError::VerbNotAllowed {
                    verb: verb.to_string(),
                    current: state.to_string(),
                    allowed: "(no current state)".to_string(),
                }),
            };
        }

        let allowed = || {
            transition
                .from_states
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        let Some(state) = current else {
            return Err(TransitionError::VerbNotAllowed {
                verb: verb.to_string(),
                current: "(none)".to_string(),
                allowed: allowed(),
            });
        };
        if !transition.from_states.contains(state) {
            return Err(TransitionError::VerbNotAllowed {
                verb: verb.to_string(),
                current: state.to_string(),
                allowed: allowed(),
            });
        }

        self.state_machine
            .validate_transition(state, &transition.to_state)?;
        Ok(Some(transition.to_state.clone()))
    }

    /// Fold `apply_verb` over the top-level verbs of `tree` in order. Nothing
    /// is mutated; callers commit the returned state only on success.
    pub fn plan_transitions(
        &self,
        current: Option<&str>,
        tree: &SyntaxTree,
    ) -> TransitionResult<Option<String>> {
        let mut state = current.map(str::to_string);
        for expr in tree.expressions() {
            let Some(head) = expr.head().filter(|h| h.is(NodeKind::Verb)) else {
                continue;
            };
            match self.apply_verb(state.as_deref(), head.value()) {
                Ok(next) => state = next,
                Err(e) => {
                    debug!(domain = %self.domain, verb = head.value(), "transition rejected: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn vocabulary() -> DomainVocabulary {
        let machine = DomainStateMachine::new(
            "onboarding",
            ["CREATE", "PRODUCTS_ADDED", "KYC_STARTED"],
            "CREATE",
            [
                ("CREATE", vec!["PRODUCTS_ADDED"]),
                ("PRODUCTS_ADDED", vec!["KYC_STARTED"]),
            ],
        )
        .unwrap();

        DomainVocabulary::new(
            "onboarding",
            vec![
                VerbDefinition::new("case.create", "case", "Create a case")
                    .with_transition(Vec::<String>::new(), "CREATE"),
                VerbDefinition::new("products.add", "products", "Add products")
                    .with_transition(["CREATE"], "PRODUCTS_ADDED"),
                VerbDefinition::new("kyc.start", "kyc", "Start KYC")
                    .with_transition(["PRODUCTS_ADDED"], "KYC_STARTED"),
                VerbDefinition::new("case.update", "case", "Update a case"),
            ],
            machine,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_verb_format() {
        assert!(validate_verb_format("kyc.declare-entity").is_ok());
        assert!(validate_verb_format("cbu.id").is_ok());
        assert!(validate_verb_format("invalid-verb").is_err());
        assert!(validate_verb_format(".x").is_err());
        assert!(validate_verb_format("a.b_c").is_err());
    }

    #[test]
    fn test_unknown_verb_rejects_whole_tree() {
        let v = vocabulary();
        let tree = parse("(case.create) (case.explode) (products.add)").unwrap();
        let err = v.validate_verbs(&tree).unwrap_err();
        assert_eq!(err.to_string(), "unknown verb: case.explode (domain 'onboarding')");
    }

    #[test]
    fn test_nested_heads_are_not_verbs() {
        let v = vocabulary();
        let tree = parse(r#"(case.create (cbu.id "CBU-1") (nature-purpose "x"))"#).unwrap();
        assert!(v.validate_verbs(&tree).is_ok());
    }

    #[test]
    fn test_apply_verb_rules() {
        let v = vocabulary();
        assert_eq!(v.apply_verb(None, "case.create").unwrap().as_deref(), Some("CREATE"));
        assert!(v.apply_verb(Some("CREATE"), "case.create").is_err());
        assert_eq!(
            v.apply_verb(Some("CREATE"), "products.add").unwrap().as_deref(),
            Some("PRODUCTS_ADDED")
        );
        assert!(matches!(
            v.apply_verb(Some("CREATE"), "kyc.start"),
            Err(TransitionError::VerbNotAllowed { .. })
        ));
        assert!(v.apply_verb(None, "products.add").is_err());
        assert_eq!(
            v.apply_verb(Some("CREATE"), "case.update").unwrap().as_deref(),
            Some("CREATE")
        );
    }

    #[test]
    fn test_plan_transitions_folds_in_order() {
        let v = vocabulary();
        let tree = parse("(case.create) (case.update) (products.add) (kyc.start)").unwrap();
        assert_eq!(
            v.plan_transitions(None, &tree).unwrap().as_deref(),
            Some("KYC_STARTED")
        );

        let bad = parse("(products.add) (products.add)").unwrap();
        assert!(v.plan_transitions(Some("CREATE"), &bad).is_err());
    }

    #[test]
    fn test_verb_transition_states_must_exist() {
        let machine = DomainStateMachine::new("d", ["A"], "A", [("A", Vec::<&str>::new())]).unwrap();
        let err = DomainVocabulary::new(
            "d",
            vec![VerbDefinition::new("d.go", "d", "").with_transition(["A"], "B")],
            machine,
        )
        .unwrap_err();
        assert!(matches!(err, VocabularyError::InvalidState { ref state, .. } if state == "B"));
    }

    #[test]
    fn test_duplicate_verbs_rejected() {
        let machine = DomainStateMachine::new("d", ["A"], "A", [("A", Vec::<&str>::new())]).unwrap();
        let err = DomainVocabulary::new(
            "d",
            vec![
                VerbDefinition::new("d.go", "d", ""),
                VerbDefinition::new("d.go", "d", ""),
            ],
            machine,
        )
        .unwrap_err();
        assert!(matches!(err, VocabularyError::DuplicateVerb { .. }));
    }

    #[test]
    fn test_bad_argument_pattern_rejected_at_construction() {
        let machine = DomainStateMachine::new("d", ["A"], "A", [("A", Vec::<&str>::new())]).unwrap();
        let err = DomainVocabulary::new(
            "d",
            vec![VerbDefinition::new("d.go", "d", "")
                .with_argument(ArgumentSpec::new("code", ArgType::String).with_pattern("^[A-Z"))],
            machine,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VocabularyError::InvalidPattern { ref verb, ref argument, .. } if verb == "d.go" && argument == "code"
        ));
    }

    #[test]
    fn test_argument_pattern_compiles_once_and_serializes_as_text() {
        let spec = ArgumentSpec::new("jurisdiction", ArgType::String).with_pattern(r"^[A-Z]{2}$");
        let pattern = spec.pattern.as_ref().unwrap();
        assert!(pattern.regex().unwrap().is_match("LU"));
        assert!(!pattern.regex().unwrap().is_match("lux"));

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["pattern"], serde_json::json!(r"^[A-Z]{2}$"));
        let back: ArgumentSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }
}
