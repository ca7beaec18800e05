//! Domain Implementations Module
//!
//! Each domain bundles the vocabulary it accepts, optional grammar rules
//! that tighten the universal grammar for its documents, and the templates
//! the shipped fragment generator renders for it.
//!
//! ## Available Domains:
//! - `onboarding`: client onboarding workflows and case management
//! - `orchestration`: headers describing a multi-domain run
//! - `kyc`: Know Your Customer verification
//! - `ubo`: Ultimate Beneficial Ownership discovery
//! - `trust-kyc`: trust party identification and deed verification
//! - `hedge-fund-investor`: investor lifecycle from opportunity to offboarding
//! - `custody`, `trading`, `compliance`: product domains
//! - `eu-compliance`, `us-compliance`: jurisdictional regimes

pub mod investor;
pub mod kyc;
pub mod onboarding;
pub mod orchestration;
pub mod products;
pub mod ubo;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{GrammarResult, VocabularyError, VocabularyResult};
use crate::grammar::GrammarEngine;
use crate::vocabulary::DomainVocabulary;

/// A domain: its vocabulary plus the optional grammar rules and templates
/// that go with it. Immutable once built.
#[derive(Debug, Clone)]
pub struct Domain {
    name: String,
    description: String,
    vocabulary: DomainVocabulary,
    grammar_rules: Option<String>,
    templates: BTreeMap<Option<String>, String>,
}

impl Domain {
    pub fn new(description: impl Into<String>, vocabulary: DomainVocabulary) -> Self {
        Self {
            name: vocabulary.domain().to_string(),
            description: description.into(),
            vocabulary,
            grammar_rules: None,
            templates: BTreeMap::new(),
        }
    }

    /// Rules loaded into the domain's scope of a [`GrammarEngine`]
    pub fn with_grammar_rules(mut self, rules: impl Into<String>) -> Self {
        self.grammar_rules = Some(rules.into());
        self
    }

    /// Fragment template to render when the domain is in `state`;
    /// `None` is the template that starts the domain.
    pub fn with_template(mut self, state: Option<&str>, template: impl Into<String>) -> Self {
        self.templates
            .insert(state.map(str::to_string), template.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn vocabulary(&self) -> &DomainVocabulary {
        &self.vocabulary
    }

    pub fn grammar_rules(&self) -> Option<&str> {
        self.grammar_rules.as_deref()
    }

    pub fn template_for(&self, state: Option<&str>) -> Option<&str> {
        self.templates
            .get(&state.map(str::to_string))
            .map(String::as_str)
    }
}

/// Registry of the domains a process knows about. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    domains: BTreeMap<String, Arc<Domain>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain; names must be unique.
    pub fn register(&mut self, domain: Domain) -> VocabularyResult<()> {
        if self.domains.contains_key(domain.name()) {
            return Err(VocabularyError::DuplicateDomain {
                domain: domain.name().to_string(),
            });
        }
        debug!(domain = domain.name(), verbs = domain.vocabulary().len(), "domain registered");
        self.domains
            .insert(domain.name().to_string(), Arc::new(domain));
        Ok(())
    }

    pub fn get(&self, name: &str) -> VocabularyResult<Arc<Domain>> {
        self.domains
            .get(name)
            .cloned()
            .ok_or_else(|| VocabularyError::DomainNotFound {
                domain: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.domains.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.domains.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Domain whose vocabulary defines `verb`, searching in name order.
    pub fn domain_for_verb(&self, verb: &str) -> Option<Arc<Domain>> {
        self.domains
            .values()
            .find(|d| d.vocabulary().contains(verb))
            .cloned()
    }

    /// Grammar engine with the universal rules plus every domain's own rules
    /// in that domain's scope.
    pub fn grammar_engine(&self) -> GrammarResult<GrammarEngine> {
        let mut engine = GrammarEngine::with_default_rules();
        for domain in self.domains.values() {
            if let Some(rules) = domain.grammar_rules() {
                engine.load_rules(rules, Some(domain.name()))?;
            }
        }
        Ok(engine)
    }
}

/// Register all standard domains
pub fn register_all_domains(registry: &mut DomainRegistry) -> VocabularyResult<()> {
    registry.register(onboarding::domain()?)?;
    registry.register(kyc::domain()?)?;
    registry.register(kyc::trust_domain()?)?;
    registry.register(ubo::domain()?)?;
    registry.register(investor::domain()?)?;
    registry.register(orchestration::domain()?)?;
    registry.register(products::custody_domain()?)?;
    registry.register(products::trading_domain()?)?;
    registry.register(products::compliance_domain()?)?;
    registry.register(products::eu_compliance_domain()?)?;
    registry.register(products::us_compliance_domain()?)?;
    Ok(())
}

/// A registry holding every standard domain
pub fn standard_registry() -> VocabularyResult<DomainRegistry> {
    let mut registry = DomainRegistry::new();
    register_all_domains(&mut registry)?;
    Ok(registry)
}

/// Get list of all available domain names
pub fn available_domains() -> Vec<&'static str> {
    vec![
        "compliance",
        "custody",
        "eu-compliance",
        "hedge-fund-investor",
        "kyc",
        "onboarding",
        "orchestration",
        "trading",
        "trust-kyc",
        "ubo",
        "us-compliance",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_standard_registry_matches_available_domains() {
        let registry = standard_registry().unwrap();
        assert_eq!(registry.names(), available_domains());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = standard_registry().unwrap();
        let err = registry.register(kyc::domain().unwrap()).unwrap_err();
        assert!(matches!(err, VocabularyError::DuplicateDomain { .. }));
        assert!(matches!(
            registry.get("nope"),
            Err(VocabularyError::DomainNotFound { .. })
        ));
    }

    #[test]
    fn test_domain_for_verb() {
        let registry = standard_registry().unwrap();
        assert_eq!(
            registry.domain_for_verb("ubo.resolve-ubos").map(|d| d.name().to_string()),
            Some("ubo".to_string())
        );
        assert!(registry.domain_for_verb("nope.nothing").is_none());
    }

    #[test]
    fn test_start_templates_are_valid_dsl_for_their_domain() {
        let registry = standard_registry().unwrap();
        let grammar = registry.grammar_engine().unwrap();

        for name in registry.names() {
            let domain = registry.get(name).unwrap();
            let template = domain
                .template_for(None)
                .unwrap_or_else(|| panic!("{} has no start template", name));
            // Substitute every slot with a plain string so the text parses
            let text = regex::Regex::new(r"<[A-Za-z0-9_]+>")
                .unwrap()
                .replace_all(template, "\"X\"");

            let tree = parse(&text).unwrap();
            domain.vocabulary().validate_verbs(&tree).unwrap();
            domain.vocabulary().plan_transitions(None, &tree).unwrap();
            grammar.validate(&text, Some(name)).unwrap();
        }
    }

    #[test]
    fn test_follow_up_templates_continue_from_their_state() {
        let registry = standard_registry().unwrap();
        for name in registry.names() {
            let domain = registry.get(name).unwrap();
            for state in domain.vocabulary().state_machine().states() {
                if let Some(template) = domain.template_for(Some(state)) {
                    let text = regex::Regex::new(r"<[A-Za-z0-9_]+>")
                        .unwrap()
                        .replace_all(template, "\"X\"");
                    let tree = parse(&text).unwrap();
                    domain
                        .vocabulary()
                        .plan_transitions(Some(state), &tree)
                        .unwrap_or_else(|e| panic!("{} from {}: {}", name, state, e));
                }
            }
        }
    }
}
