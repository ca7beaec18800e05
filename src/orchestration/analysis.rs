//! Context analysis: which domains a request needs and how they depend on
//! each other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default EU member states
const EU_MEMBER_STATES: [&str; 27] = [
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT", "LV",
    "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
];

/// A request to start an orchestrated workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationRequest {
    pub session_id: Option<String>,
    pub cbu_id: Option<String>,
    pub investor_id: Option<String>,
    pub fund_id: Option<String>,
    pub entity_id: Option<String>,
    /// PROPER_PERSON, CORPORATE, PARTNERSHIP or TRUST
    pub entity_type: Option<String>,
    pub entity_name: Option<String>,
    pub jurisdiction: Option<String>,
    pub products: Vec<String>,
    pub services: Vec<String>,
    /// ONBOARDING, INVESTMENT or KYC_REFRESH
    pub workflow_type: Option<String>,
    pub risk_profile: Option<String>,
    pub compliance_tier: Option<String>,
    pub initial_context: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn for_domain_count(count: usize) -> Self {
        match count {
            0..=2 => Complexity::Low,
            3..=4 => Complexity::Medium,
            _ => Complexity::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "LOW",
            Complexity::Medium => "MEDIUM",
            Complexity::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub primary_domain: String,
    /// De-duplicated and sorted; always contains the primary domain
    pub required_domains: Vec<String>,
    pub entity_types: Vec<String>,
    pub products: Vec<String>,
    pub compliance_tier: String,
    /// domain -> domains that must run first
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub estimated_complexity: Complexity,
}

/// Domains and ordering constraints an entity type brings in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRule {
    pub domains: Vec<String>,
    /// `(domain, must_run_after)`
    pub dependencies: Vec<(String, String)>,
}

impl EntityRule {
    fn new(domains: &[&str], dependencies: &[(&str, &str)]) -> Self {
        Self {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            dependencies: dependencies
                .iter()
                .map(|(d, on)| (d.to_string(), on.to_string()))
                .collect(),
        }
    }
}

/// Product keyword rule: any keyword found in a product name (case
/// insensitive) adds the domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRule {
    pub keywords: Vec<String>,
    pub domain: String,
}

/// The dependency and inclusion table driving analysis and planning.
/// `DomainRules::default()` is the standard table; tests and deployments
/// can inject their own through `Orchestrator::with_rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRules {
    pub default_primary: String,
    pub investment_primary: String,
    pub entity_rules: BTreeMap<String, EntityRule>,
    pub product_rules: Vec<ProductRule>,
    pub eu_jurisdictions: BTreeSet<String>,
    /// Planning weight per domain; unlisted domains weigh 1.0
    pub complexity: BTreeMap<String, f64>,
}

impl Default for DomainRules {
    fn default() -> Self {
        let entity_rules = [
            ("CORPORATE", EntityRule::new(&["kyc", "ubo"], &[("ubo", "kyc")])),
            ("PARTNERSHIP", EntityRule::new(&["kyc", "ubo"], &[("ubo", "kyc")])),
            (
                "TRUST",
                EntityRule::new(
                    &["kyc", "ubo", "trust-kyc"],
                    &[("trust-kyc", "kyc"), ("ubo", "trust-kyc")],
                ),
            ),
            ("PROPER_PERSON", EntityRule::new(&["kyc"], &[])),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let product_rules = [
            (vec!["custody"], "custody"),
            (vec!["trading", "execution"], "trading"),
            (vec!["compliance", "reporting"], "compliance"),
        ]
        .into_iter()
        .map(|(keywords, domain)| ProductRule {
            keywords: keywords.into_iter().map(str::to_string).collect(),
            domain: domain.to_string(),
        })
        .collect();

        let complexity = [
            ("onboarding", 1.0),
            ("kyc", 2.0),
            ("ubo", 3.0),
            ("trust-kyc", 2.5),
            ("custody", 2.0),
            ("trading", 1.5),
            ("compliance", 2.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            default_primary: "onboarding".to_string(),
            investment_primary: "hedge-fund-investor".to_string(),
            entity_rules,
            product_rules,
            eu_jurisdictions: EU_MEMBER_STATES.iter().map(|s| s.to_string()).collect(),
            complexity,
        }
    }
}

impl DomainRules {
    pub fn complexity_of(&self, domain: &str) -> f64 {
        self.complexity.get(domain).copied().unwrap_or(1.0)
    }

    pub fn is_eu(&self, jurisdiction: &str) -> bool {
        self.eu_jurisdictions.contains(&jurisdiction.to_uppercase())
    }

    fn primary_domain(&self, request: &OrchestrationRequest) -> String {
        let investment = request.workflow_type.as_deref() == Some("INVESTMENT");
        let fund_product = request.products.iter().any(|p| {
            let p = p.to_lowercase();
            p.contains("hedge") || p.contains("fund")
        });
        if investment && fund_product {
            self.investment_primary.clone()
        } else {
            self.default_primary.clone()
        }
    }

    /// Work out the domains a request needs and their ordering constraints.
    pub fn analyze(&self, request: &OrchestrationRequest) -> ContextAnalysis {
        let primary_domain = self.primary_domain(request);
        let mut required = BTreeSet::from([primary_domain.clone()]);
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut entity_types = Vec::new();

        if let Some(entity_type) = request.entity_type.as_deref().filter(|t| !t.is_empty()) {
            entity_types.push(entity_type.to_string());
            if let Some(rule) = self.entity_rules.get(&entity_type.to_uppercase()) {
                required.extend(rule.domains.iter().cloned());
                for (domain, on) in &rule.dependencies {
                    let deps = dependencies.entry(domain.clone()).or_default();
                    if !deps.contains(on) {
                        deps.push(on.clone());
                    }
                }
            }
        }

        for product in &request.products {
            let product = product.to_lowercase();
            for rule in &self.product_rules {
                if rule.keywords.iter().any(|k| product.contains(k.as_str())) {
                    required.insert(rule.domain.clone());
                }
            }
        }

        let mut compliance_tier = request
            .compliance_tier
            .clone()
            .unwrap_or_else(|| "STANDARD".to_string());
        if let Some(jurisdiction) = request.jurisdiction.as_deref() {
            if self.is_eu(jurisdiction) {
                required.insert("eu-compliance".to_string());
                compliance_tier = "ENHANCED".to_string();
            }
            if jurisdiction.eq_ignore_ascii_case("US") {
                required.insert("us-compliance".to_string());
                compliance_tier = "ENHANCED".to_string();
            }
        }

        let required_domains: Vec<String> = required.into_iter().collect();
        ContextAnalysis {
            estimated_complexity: Complexity::for_domain_count(required_domains.len()),
            primary_domain,
            required_domains,
            entity_types,
            products: request.products.clone(),
            compliance_tier,
            dependencies,
        }
    }
}
