//! Data-driven grammar rules for the DSL
//!
//! Rules are stored as text in a small EBNF-like notation and can be scoped
//! to a domain. A domain rule shadows the universal rule of the same name
//! when validating text for that domain. Validation is an auxiliary gate: the
//! parser in [`crate::parser`] stays the authoritative reader of DSL text.

pub mod ebnf;
pub mod matcher;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GrammarError, GrammarResult, SourceLocation};

pub use ebnf::{parse_expression, parse_rules, ParsedRule, RuleExpression};
pub use matcher::{tokenize, Token, TokenKind, BUILTIN_RULES};

/// Root rule every validation starts from
pub const ROOT_RULE: &str = "dsl_document";

/// Universal grammar shared by every domain
pub const DEFAULT_GRAMMAR: &str = r#"
# A document is a sequence of top-level verb expressions
dsl_document -> expression*

expression -> "(" VERB argument* ")"

argument -> nested | ATTR_REF | STRING | NUMBER | BOOLEAN | IDENTIFIER

# Named arguments and legacy attribute forms: (cbu.id "X"), (var (attr-id "x"))
nested -> "(" IDENTIFIER argument* ")"
"#;

/// A named rule, universal when `domain` is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarRule {
    pub name: String,
    pub definition: String,
    pub domain: Option<String>,
    pub active: bool,
    #[serde(skip)]
    expression: Option<RuleExpression>,
}

impl GrammarRule {
    /// Parse `definition` and build an active rule.
    pub fn new(
        name: impl Into<String>,
        definition: impl Into<String>,
        domain: Option<&str>,
    ) -> GrammarResult<Self> {
        let definition = definition.into();
        let expression = parse_expression(&definition)?;
        Ok(Self {
            name: name.into(),
            definition,
            domain: domain.map(str::to_string),
            active: true,
            expression: Some(expression),
        })
    }

    /// Parsed body of the rule. Deserialized rules are reparsed on demand.
    pub fn expression(&self) -> GrammarResult<RuleExpression> {
        match &self.expression {
            Some(expr) => Ok(expr.clone()),
            None => parse_expression(&self.definition),
        }
    }

    fn parsed(&self) -> Option<&RuleExpression> {
        self.expression.as_ref()
    }
}

/// Rule counts, grouped by scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarSummary {
    pub rule_count: usize,
    pub active_count: usize,
    pub universal_count: usize,
    pub domains: BTreeMap<String, usize>,
}

/// Grammar engine for managing DSL rules
#[derive(Debug, Default, Clone)]
pub struct GrammarEngine {
    /// Rules keyed by (domain, name); `None` is the universal scope
    rules: BTreeMap<(Option<String>, String), GrammarRule>,
}

impl GrammarEngine {
    /// Create an engine with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine preloaded with the universal DSL grammar
    pub fn with_default_rules() -> Self {
        let mut engine = Self::new();
        // DEFAULT_GRAMMAR is a constant covered by tests
        if let Err(e) = engine.load_rules(DEFAULT_GRAMMAR, None) {
            debug!("default grammar failed to load: {}", e);
        }
        engine
    }

    /// Add or replace a rule. The definition is parsed before it is stored.
    pub fn add_rule(
        &mut self,
        name: &str,
        definition: &str,
        domain: Option<&str>,
    ) -> GrammarResult<()> {
        let rule = GrammarRule::new(name, definition, domain)?;
        self.insert(rule);
        Ok(())
    }

    fn insert(&mut self, rule: GrammarRule) {
        debug!(rule = %rule.name, domain = ?rule.domain, "grammar rule added");
        self.rules
            .insert((rule.domain.clone(), rule.name.clone()), rule);
    }

    /// Load a block of `name -> body` rules into one scope. Nothing is
    /// stored if any rule in the block is malformed.
    pub fn load_rules(&mut self, source: &str, domain: Option<&str>) -> GrammarResult<usize> {
        let parsed = parse_rules(source)?;
        let count = parsed.len();
        for ParsedRule { name, expression } in parsed {
            self.insert(GrammarRule {
                name,
                definition: expression.to_string(),
                domain: domain.map(str::to_string),
                active: true,
                expression: Some(expression),
            });
        }
        Ok(count)
    }

    /// Deactivate a rule without removing it
    pub fn deactivate(&mut self, name: &str, domain: Option<&str>) -> GrammarResult<()> {
        self.set_active(name, domain, false)
    }

    /// Re-activate a previously deactivated rule
    pub fn activate(&mut self, name: &str, domain: Option<&str>) -> GrammarResult<()> {
        self.set_active(name, domain, true)
    }

    fn set_active(&mut self, name: &str, domain: Option<&str>, active: bool) -> GrammarResult<()> {
        let key = (domain.map(str::to_string), name.to_string());
        let rule = self
            .rules
            .get_mut(&key)
            .ok_or_else(|| GrammarError::RuleNotFound {
                rule: name.to_string(),
            })?;
        rule.active = active;
        Ok(())
    }

    /// Get a rule from one scope, active or not
    pub fn get_rule(&self, name: &str, domain: Option<&str>) -> Option<&GrammarRule> {
        self.rules.get(&(domain.map(str::to_string), name.to_string()))
    }

    /// Active rules visible to `domain`: its own rules plus universal rules it
    /// does not shadow. Sorted by name.
    pub fn rules_for(&self, domain: Option<&str>) -> Vec<&GrammarRule> {
        let mut effective: BTreeMap<&str, &GrammarRule> = BTreeMap::new();

        for rule in self.rules.values().filter(|r| r.active && r.domain.is_none()) {
            effective.insert(&rule.name, rule);
        }
        if let Some(domain) = domain {
            for rule in self
                .rules
                .values()
                .filter(|r| r.active && r.domain.as_deref() == Some(domain))
            {
                effective.insert(&rule.name, rule);
            }
        }

        effective.into_values().collect()
    }

    /// Names of the rules visible to `domain`
    pub fn rule_names(&self, domain: Option<&str>) -> Vec<String> {
        self.rules_for(domain)
            .into_iter()
            .map(|r| r.name.clone())
            .collect()
    }

    fn effective_expressions(&self, domain: Option<&str>) -> HashMap<String, &RuleExpression> {
        self.rules_for(domain)
            .into_iter()
            .filter_map(|r| r.parsed().map(|e| (r.name.clone(), e)))
            .collect()
    }

    /// Report every reference to a rule that is neither defined for
    /// `domain` nor a built-in token class.
    pub fn check_references(&self, domain: Option<&str>) -> Result<(), Vec<GrammarError>> {
        let expressions = self.effective_expressions(domain);
        let mut errors = Vec::new();

        let mut names: Vec<&String> = expressions.keys().collect();
        names.sort();
        for name in names {
            let mut seen = HashSet::new();
            for reference in expressions[name].references() {
                if !expressions.contains_key(reference)
                    && !BUILTIN_RULES.contains(&reference)
                    && seen.insert(reference)
                {
                    errors.push(GrammarError::UndefinedReference {
                        name: reference.to_string(),
                        rule: name.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Detect left-recursive cycles in every scope. A rule that can reach
    /// itself before consuming a token would never terminate when matched.
    pub fn check_circular_dependencies(&self) -> GrammarResult<()> {
        let mut scopes: BTreeSet<Option<&str>> = BTreeSet::new();
        scopes.insert(None);
        for (domain, _) in self.rules.keys() {
            scopes.insert(domain.as_deref());
        }

        for scope in scopes {
            self.detect_cycles(scope)?;
        }
        Ok(())
    }

    fn detect_cycles(&self, domain: Option<&str>) -> GrammarResult<()> {
        fn visit<'a>(
            rule_name: &'a str,
            rules: &HashMap<String, &'a RuleExpression>,
            path: &mut Vec<&'a str>,
            visited: &mut HashSet<&'a str>,
        ) -> GrammarResult<()> {
            if let Some(start) = path.iter().position(|r| *r == rule_name) {
                let mut chain: Vec<&str> = path[start..].to_vec();
                chain.push(rule_name);
                return Err(GrammarError::CircularRule {
                    chain: chain.join(" -> "),
                });
            }

            if visited.contains(rule_name) {
                return Ok(());
            }

            let Some(expr) = rules.get(rule_name).copied() else {
                return Ok(());
            };

            path.push(rule_name);
            for next in expr.leftmost_references() {
                visit(next, rules, path, visited)?;
            }
            path.pop();
            visited.insert(rule_name);
            Ok(())
        }

        let rules = self.effective_expressions(domain);
        let mut names: Vec<&str> = rules.keys().map(String::as_str).collect();
        names.sort();

        let mut visited = HashSet::new();
        for name in names {
            let mut path = Vec::new();
            visit(name, &rules, &mut path, &mut visited)?;
        }
        Ok(())
    }

    /// Check that a rule is visible to `domain` and that everything it
    /// references is defined.
    pub fn validate_rule(&self, name: &str, domain: Option<&str>) -> GrammarResult<()> {
        let expressions = self.effective_expressions(domain);
        let expr = expressions
            .get(name)
            .ok_or_else(|| GrammarError::RuleNotFound {
                rule: name.to_string(),
            })?;

        for reference in expr.references() {
            if !expressions.contains_key(reference) && !BUILTIN_RULES.contains(&reference) {
                return Err(GrammarError::UndefinedReference {
                    name: reference.to_string(),
                    rule: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Match `text` against the rules visible to `domain`, starting at
    /// [`ROOT_RULE`]. Every token must be consumed. Only the visible rules
    /// are checked for left recursion, so a broken rule in another domain's
    /// scope does not affect this one.
    pub fn validate(&self, text: &str, domain: Option<&str>) -> Result<(), Vec<GrammarError>> {
        self.detect_cycles(domain).map_err(|e| vec![e])?;

        let tokens = tokenize(text).map_err(|e| vec![e])?;
        let expressions = self.effective_expressions(domain);
        let end = crate::parser::diagnostics::byte_to_line_col(text, text.len());
        let end_location = SourceLocation::new(end.0, end.1, text.len());

        let result = matcher::Matcher::new(&expressions, &tokens, end_location).run(ROOT_RULE);
        if let Err(errors) = &result {
            debug!(domain = ?domain, errors = errors.len(), "grammar validation failed");
        }
        result
    }

    /// Counts for diagnostics and the CLI
    pub fn summary(&self) -> GrammarSummary {
        let mut domains = BTreeMap::new();
        for (domain, _) in self.rules.keys() {
            if let Some(domain) = domain {
                *domains.entry(domain.clone()).or_insert(0) += 1;
            }
        }
        GrammarSummary {
            rule_count: self.rules.len(),
            active_count: self.rules.values().filter(|r| r.active).count(),
            universal_count: self.rules.keys().filter(|(d, _)| d.is_none()).count(),
            domains,
        }
    }
}
