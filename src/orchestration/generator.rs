//! Fragment generation
//!
//! The orchestrator asks a [`FragmentGenerator`] for each domain's next
//! fragment. `TemplateFragmentGenerator` renders the domain's templates
//! through the placeholder resolver; an LLM-backed generator can implement
//! the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domains::DomainRegistry;
use crate::error::PlaceholderError;
use crate::placeholder::PlaceholderResolver;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFragment {
    pub dsl: String,
    /// The state the generator expects the fragment to reach. Advisory only;
    /// the verbs decide.
    pub to_state_hint: Option<String>,
    /// Workflow component the fragment was written for (`entity`,
    /// `product_custody`, ...). When set, the fragment goes to the domain
    /// owning the component instead of the domain that was asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl GeneratedFragment {
    pub fn new(dsl: impl Into<String>) -> Self {
        Self {
            dsl: dsl.into(),
            to_state_hint: None,
            component: None,
        }
    }

    pub fn for_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

#[async_trait]
pub trait FragmentGenerator: Send + Sync {
    async fn generate(
        &self,
        domain: &str,
        context: &HashMap<String, Value>,
    ) -> anyhow::Result<GeneratedFragment>;
}

/// Renders `Domain` templates keyed by the domain's current state
pub struct TemplateFragmentGenerator {
    registry: DomainRegistry,
    resolver: PlaceholderResolver,
    defaults: HashMap<String, String>,
}

impl TemplateFragmentGenerator {
    pub fn new(registry: DomainRegistry) -> Self {
        let defaults = [
            ("compliance_tier", "STANDARD"),
            ("risk_profile", "MEDIUM"),
            ("entity_type", "CORPORATE"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            registry,
            resolver: PlaceholderResolver::new(),
            defaults,
        }
    }

    /// Add or replace a fallback value used when the context has none
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl FragmentGenerator for TemplateFragmentGenerator {
    async fn generate(
        &self,
        domain: &str,
        context: &HashMap<String, Value>,
    ) -> anyhow::Result<GeneratedFragment> {
        let definition = self.registry.get(domain)?;
        let state = context.get("domain_state").and_then(Value::as_str);
        let template = definition.template_for(state).ok_or_else(|| {
            anyhow::anyhow!(
                "no template for domain '{}' in state {}",
                domain,
                state.unwrap_or("(start)")
            )
        })?;

        let dsl = self
            .resolver
            .resolve_with_defaults(template, context, &self.defaults);
        let leftover = self.resolver.find_placeholders(&dsl);
        if !leftover.is_empty() {
            return Err(PlaceholderError::Unresolved { tokens: leftover }.into());
        }

        let to_state_hint = definition.vocabulary().infer_state_from_text(&dsl);
        debug!(domain, state = state.unwrap_or("-"), hint = ?to_state_hint, "fragment rendered");
        Ok(GeneratedFragment {
            dsl,
            to_state_hint,
            component: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::standard_registry;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_renders_start_template() {
        let generator = TemplateFragmentGenerator::new(standard_registry().unwrap());
        let fragment = generator
            .generate(
                "onboarding",
                &ctx(&[
                    ("cbu_id", json!("CBU-1234")),
                    ("entity_name", json!("ACME Ltd")),
                    ("products", json!(["CUSTODY", "FUND_ACCOUNTING"])),
                ]),
            )
            .await
            .unwrap();

        assert!(fragment.dsl.contains("(cbu.id \"CBU-1234\")"));
        assert!(fragment.dsl.contains("(products.add \"CUSTODY\" \"FUND_ACCOUNTING\")"));
        assert_eq!(fragment.to_state_hint.as_deref(), Some("PRODUCTS_ADDED"));
    }

    #[tokio::test]
    async fn test_state_selects_template_and_defaults_fill_gaps() {
        let generator = TemplateFragmentGenerator::new(standard_registry().unwrap());
        let fragment = generator
            .generate("onboarding", &ctx(&[("domain_state", json!("PRODUCTS_ADDED"))]))
            .await
            .unwrap();
        assert_eq!(fragment.dsl, "(kyc.start (requirements \"STANDARD\"))");
        assert_eq!(fragment.to_state_hint.as_deref(), Some("KYC_STARTED"));
    }

    #[tokio::test]
    async fn test_missing_values_are_reported() {
        let generator = TemplateFragmentGenerator::new(standard_registry().unwrap());
        let err = generator.generate("onboarding", &HashMap::new()).await.unwrap_err();
        let placeholder = err.downcast_ref::<PlaceholderError>().unwrap();
        assert!(placeholder.tokens().contains(&"cbu_id".to_string()));
        assert!(err.to_string().starts_with("unresolved placeholders"));
    }

    #[tokio::test]
    async fn test_unknown_domain_and_state() {
        let generator = TemplateFragmentGenerator::new(standard_registry().unwrap());
        assert!(generator.generate("nowhere", &HashMap::new()).await.is_err());
        let err = generator
            .generate("onboarding", &ctx(&[("domain_state", json!("ARCHIVED"))]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no template"));
    }
}
