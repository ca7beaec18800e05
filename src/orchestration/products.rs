//! Product requirements: which entity types a product supports, the
//! operations it needs, and the workflow header it contributes to a run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::placeholder::resolver::quote;

/// Entity type that matches every entity
pub const ALL_ENTITY_TYPES: &str = "ALL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub rule_id: String,
    pub framework: String,
    pub description: String,
    pub required: bool,
}

/// Extra operations a product needs for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub entity_type: String,
    pub required_dsl: Vec<String>,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRequirements {
    pub product_id: String,
    pub product_name: String,
    /// Supported entity types; `ALL` matches any
    pub entity_types: Vec<String>,
    /// Verbs every workflow for this product runs
    pub required_dsl: Vec<String>,
    pub attributes: Vec<String>,
    pub compliance: Vec<ComplianceRule>,
    /// Products that should be requested alongside this one
    pub prerequisites: Vec<String>,
    pub conditional_rules: Vec<ConditionalRule>,
}

impl ProductRequirements {
    pub fn supports(&self, entity_type: &str) -> bool {
        self.entity_types
            .iter()
            .any(|t| t == ALL_ENTITY_TYPES || t.eq_ignore_ascii_case(entity_type))
    }

    /// Conditional rules that apply to `entity_type`
    pub fn rules_for<'a>(&'a self, entity_type: &'a str) -> impl Iterator<Item = &'a ConditionalRule> {
        self.conditional_rules
            .iter()
            .filter(move |rule| rule.entity_type.eq_ignore_ascii_case(entity_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductValidation {
    pub product_id: String,
    pub entity_type: String,
    pub compatible: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub requirements: Option<ProductRequirements>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    Generating,
    Ready,
    Executing,
    Completed,
    Failed,
}

/// The operations one product needs for one client entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductWorkflow {
    pub workflow_id: Uuid,
    pub cbu_id: String,
    pub product_id: String,
    pub entity_type: String,
    /// Base plus conditional verbs, in order, without repeats
    pub required_dsl: Vec<String>,
    pub attributes: Vec<String>,
    pub compliance_rules: Vec<ComplianceRule>,
    pub generated_dsl: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

/// Product table keyed by upper-case product id.
/// `ProductCatalog::default()` is the standard table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    products: BTreeMap<String, ProductRequirements>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn compliance(rule_id: &str, framework: &str, description: &str) -> ComplianceRule {
    ComplianceRule {
        rule_id: rule_id.to_string(),
        framework: framework.to_string(),
        description: description.to_string(),
        required: true,
    }
}

fn conditional(entity_type: &str, required_dsl: &[&str], attributes: &[&str]) -> ConditionalRule {
    ConditionalRule {
        entity_type: entity_type.to_string(),
        required_dsl: strings(required_dsl),
        attributes: strings(attributes),
    }
}

impl Default for ProductCatalog {
    fn default() -> Self {
        let products = vec![
            ProductRequirements {
                product_id: "CUSTODY".to_string(),
                product_name: "Custody".to_string(),
                entity_types: strings(&[ALL_ENTITY_TYPES]),
                required_dsl: strings(&[
                    "custody.account-setup",
                    "custody.open-account",
                    "custody.configure-ssi",
                ]),
                attributes: strings(&["custody.account_number", "custody.settlement_currency"]),
                compliance: vec![compliance("CUST-001", "SAFEKEEPING", "Segregation of client assets")],
                prerequisites: Vec::new(),
                conditional_rules: vec![conditional("TRUST", &["trust.begin"], &["trust.deed_reference"])],
            },
            ProductRequirements {
                product_id: "FUND_ACCOUNTING".to_string(),
                product_name: "Fund Accounting".to_string(),
                entity_types: strings(&["CORPORATE", "PARTNERSHIP", "TRUST"]),
                required_dsl: strings(&["services.discover", "services.provision"]),
                attributes: strings(&["fund.base_currency", "fund.valuation_frequency"]),
                compliance: vec![compliance("FA-001", "NAV", "Independent NAV calculation")],
                prerequisites: strings(&["CUSTODY"]),
                conditional_rules: vec![conditional("PARTNERSHIP", &["ubo.start"], &["partnership.gp_name"])],
            },
            ProductRequirements {
                product_id: "TRADING".to_string(),
                product_name: "Trading".to_string(),
                entity_types: strings(&[ALL_ENTITY_TYPES]),
                required_dsl: strings(&["trading.create-profile", "trading.set-limits"]),
                attributes: strings(&["trading.limit_currency"]),
                compliance: vec![compliance("TRD-001", "MIFID", "Best execution policy")],
                prerequisites: Vec::new(),
                conditional_rules: vec![conditional(
                    "PROPER_PERSON",
                    &["compliance.screen"],
                    &["investor.suitability"],
                )],
            },
            ProductRequirements {
                product_id: "PRIME_BROKERAGE".to_string(),
                product_name: "Prime Brokerage".to_string(),
                entity_types: strings(&["CORPORATE", "PARTNERSHIP"]),
                required_dsl: strings(&[
                    "trading.create-profile",
                    "trading.set-limits",
                    "custody.open-account",
                ]),
                attributes: strings(&["pb.margin_currency", "pb.credit_limit"]),
                compliance: vec![
                    compliance("PB-001", "MIFID", "Professional client classification"),
                    compliance("PB-002", "EMIR", "Collateral reporting"),
                ],
                prerequisites: strings(&["CUSTODY", "TRADING"]),
                conditional_rules: Vec::new(),
            },
            ProductRequirements {
                product_id: "TRANSFER_AGENCY".to_string(),
                product_name: "Transfer Agency".to_string(),
                entity_types: strings(&["CORPORATE", "PARTNERSHIP", "TRUST"]),
                required_dsl: strings(&["services.discover", "resources.plan"]),
                attributes: strings(&["ta.register_id"]),
                compliance: vec![compliance("TA-001", "AML", "Investor register screening")],
                prerequisites: Vec::new(),
                conditional_rules: vec![conditional("TRUST", &["ubo.start"], &["trust.beneficiary_register"])],
            },
        ];
        Self::new(products)
    }
}

impl ProductCatalog {
    pub fn new(products: Vec<ProductRequirements>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|p| (p.product_id.to_uppercase(), p))
                .collect(),
        }
    }

    /// Catalog with no products; every request product is unknown
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn get(&self, product_id: &str) -> Option<&ProductRequirements> {
        self.products.get(&product_id.to_uppercase())
    }

    /// Known product ids, sorted
    pub fn product_ids(&self) -> Vec<&str> {
        self.products.keys().map(String::as_str).collect()
    }

    /// One result per requested product. Unknown products are reported as
    /// incompatible with an issue; missing prerequisites are warnings.
    pub fn validate_compatibility(&self, entity_type: &str, products: &[String]) -> Vec<ProductValidation> {
        products
            .iter()
            .map(|product_id| {
                let Some(requirements) = self.get(product_id) else {
                    return ProductValidation {
                        product_id: product_id.clone(),
                        entity_type: entity_type.to_string(),
                        compatible: false,
                        issues: vec![format!("unknown product '{}'", product_id)],
                        warnings: Vec::new(),
                        requirements: None,
                    };
                };

                let mut issues = Vec::new();
                if !requirements.supports(entity_type) {
                    issues.push(format!(
                        "product {} does not support entity type {} (supported: {})",
                        requirements.product_id,
                        entity_type,
                        requirements.entity_types.join(", ")
                    ));
                }
                let warnings = requirements
                    .prerequisites
                    .iter()
                    .filter(|pre| !products.iter().any(|p| p.eq_ignore_ascii_case(pre)))
                    .map(|pre| format!("product {} usually requires {}", requirements.product_id, pre))
                    .collect();

                ProductValidation {
                    product_id: requirements.product_id.clone(),
                    entity_type: entity_type.to_string(),
                    compatible: issues.is_empty(),
                    issues,
                    warnings,
                    requirements: Some(requirements.clone()),
                }
            })
            .collect()
    }

    /// Reject a known product the entity type cannot take. Unknown products
    /// are logged and let through; analysis routes them by keyword.
    pub fn check_request(&self, entity_type: &str, products: &[String]) -> OrchestrationResult<()> {
        for validation in self.validate_compatibility(entity_type, products) {
            if validation.requirements.is_none() {
                warn!(product = %validation.product_id, "product not in catalog; skipping compatibility check");
                continue;
            }
            for warning in &validation.warnings {
                debug!(product = %validation.product_id, "{}", warning);
            }
            if !validation.compatible {
                return Err(OrchestrationError::IncompatibleProduct {
                    product: validation.product_id,
                    entity_type: entity_type.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Required operations and header DSL for one product and entity
    pub fn generate_workflow(
        &self,
        cbu_id: &str,
        product_id: &str,
        entity_type: &str,
    ) -> OrchestrationResult<ProductWorkflow> {
        let requirements = self.get(product_id).ok_or_else(|| OrchestrationError::UnknownProduct {
            product: product_id.to_string(),
        })?;
        if !requirements.supports(entity_type) {
            return Err(OrchestrationError::IncompatibleProduct {
                product: requirements.product_id.clone(),
                entity_type: entity_type.to_string(),
            });
        }

        let mut required_dsl = requirements.required_dsl.clone();
        let mut attributes = requirements.attributes.clone();
        for rule in requirements.rules_for(entity_type) {
            for verb in &rule.required_dsl {
                if !required_dsl.contains(verb) {
                    required_dsl.push(verb.clone());
                }
            }
            for attribute in &rule.attributes {
                if !attributes.contains(attribute) {
                    attributes.push(attribute.clone());
                }
            }
        }

        let product = quote(&requirements.product_id);
        let cbu = quote(cbu_id);
        let customizations: Vec<String> = required_dsl.iter().map(|verb| quote(verb)).collect();
        let generated_dsl = format!(
            "(products.validate.compatibility (entities {cbu}) (products {product}) (entity.type {}))\n\
             (workflow.apply.product.requirements (products {product}) (to.entities {cbu}) (customizations {}))",
            quote(entity_type),
            customizations.join(" ")
        );

        debug!(product = %requirements.product_id, entity_type, verbs = required_dsl.len(), "product workflow generated");
        Ok(ProductWorkflow {
            workflow_id: Uuid::new_v4(),
            cbu_id: cbu_id.to_string(),
            product_id: requirements.product_id.clone(),
            entity_type: entity_type.to_string(),
            required_dsl,
            attributes,
            compliance_rules: requirements.compliance.clone(),
            generated_dsl,
            status: WorkflowStatus::Ready,
            created_at: Utc::now(),
        })
    }
}
