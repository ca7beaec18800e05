//! Onboarding Domain
//!
//! Client onboarding workflows: case creation, product configuration, KYC
//! initiation, service discovery, resource planning and attribute binding.
//!
//! ## State Machine:
//! CREATE → PRODUCTS_ADDED → KYC_STARTED → SERVICES_DISCOVERED →
//! RESOURCES_PLANNED → ATTRIBUTES_BOUND → WORKFLOW_ACTIVE → COMPLETE
//!
//! Any state may be archived.

use super::Domain;
use crate::error::VocabularyResult;
use crate::vocabulary::{ArgType, ArgumentSpec, DomainStateMachine, DomainVocabulary, VerbDefinition};

pub const DOMAIN: &str = "onboarding";

const STATES: [&str; 9] = [
    "CREATE",
    "PRODUCTS_ADDED",
    "KYC_STARTED",
    "SERVICES_DISCOVERED",
    "RESOURCES_PLANNED",
    "ATTRIBUTES_BOUND",
    "WORKFLOW_ACTIVE",
    "COMPLETE",
    "ARCHIVED",
];

const ENTITY_TYPES: [&str; 5] = ["PROPER_PERSON", "CORPORATE", "FUND", "TRUST", "PARTNERSHIP"];

/// A case document may not be empty.
const GRAMMAR_RULES: &str = r#"
dsl_document -> expression+
"#;

fn state_machine() -> VocabularyResult<DomainStateMachine> {
    let mut table: Vec<(&str, Vec<&str>)> = STATES
        .windows(2)
        .filter(|w| w[1] != "ARCHIVED")
        .map(|w| (w[0], vec![w[1], "ARCHIVED"]))
        .collect();
    table.push(("COMPLETE", vec!["ARCHIVED"]));

    DomainStateMachine::new(DOMAIN, STATES, "CREATE", table)
}

fn verbs() -> Vec<VerbDefinition> {
    let live_states = &STATES[..8];

    vec![
        // Case management
        VerbDefinition::new("case.create", "case", "Create a new onboarding case")
            .with_argument(
                ArgumentSpec::new("cbu.id", ArgType::String)
                    .required()
                    .with_pattern(r"^CBU-[A-Z0-9]+$")
                    .with_description("Client business unit identifier"),
            )
            .with_argument(ArgumentSpec::new("nature-purpose", ArgType::String).required())
            .with_transition(Vec::<&str>::new(), "CREATE")
            .with_example(r#"(case.create (cbu.id "CBU-1234") (nature-purpose "UCITS equity fund"))"#),
        VerbDefinition::new("case.update", "case", "Update case details").idempotent(),
        VerbDefinition::new("case.validate", "case", "Validate case completeness").idempotent(),
        VerbDefinition::new("case.approve", "case", "Approve the case"),
        VerbDefinition::new("case.close", "case", "Close the case")
            .with_argument(ArgumentSpec::new("reason", ArgType::String))
            .with_argument(ArgumentSpec::new("final-state", ArgType::String))
            .with_transition(["WORKFLOW_ACTIVE"], "COMPLETE"),
        VerbDefinition::new("case.archive", "case", "Archive the case in any state")
            .with_transition(live_states.iter().copied(), "ARCHIVED"),
        // Entities
        VerbDefinition::new("entity.register", "entity", "Register a legal entity")
            .with_argument(ArgumentSpec::new("type", ArgType::Enum).with_enum(ENTITY_TYPES))
            .with_argument(ArgumentSpec::new("jurisdiction", ArgType::String).with_pattern(r"^[A-Z]{2}$")),
        VerbDefinition::new("entity.classify", "entity", "Classify entity risk")
            .with_argument(
                ArgumentSpec::new("risk-level", ArgType::Enum)
                    .with_enum(["LOW", "MEDIUM", "HIGH", "PROHIBITED"]),
            ),
        VerbDefinition::new("entity.link", "entity", "Link two entities"),
        VerbDefinition::new("identity.verify", "identity", "Verify an identity"),
        VerbDefinition::new("identity.attest", "identity", "Attest an identity"),
        // Products and services
        VerbDefinition::new("products.add", "products", "Add products to the case")
            .with_transition(["CREATE"], "PRODUCTS_ADDED")
            .with_example(r#"(products.add "CUSTODY" "FUND_ACCOUNTING")"#),
        VerbDefinition::new("products.configure", "products", "Configure a product"),
        VerbDefinition::new("kyc.start", "kyc", "Start KYC for the case")
            .with_argument(ArgumentSpec::new("requirements", ArgType::Any))
            .with_transition(["PRODUCTS_ADDED"], "KYC_STARTED"),
        VerbDefinition::new("services.discover", "services", "Discover services for products")
            .with_argument(ArgumentSpec::new("for.product", ArgType::Any))
            .with_argument(ArgumentSpec::new("services", ArgType::Any))
            .with_transition(["KYC_STARTED"], "SERVICES_DISCOVERED"),
        VerbDefinition::new("services.provision", "services", "Provision a service"),
        VerbDefinition::new("services.activate", "services", "Activate a service"),
        // Resources
        VerbDefinition::new("resources.plan", "resources", "Plan resources for services")
            .with_argument(ArgumentSpec::new("resource", ArgType::Any))
            .with_transition(["SERVICES_DISCOVERED"], "RESOURCES_PLANNED"),
        VerbDefinition::new("resources.provision", "resources", "Provision a resource"),
        VerbDefinition::new("resources.configure", "resources", "Configure a resource"),
        VerbDefinition::new("resources.test", "resources", "Test a resource"),
        VerbDefinition::new("resources.deploy", "resources", "Deploy a resource"),
        // Attributes and values
        VerbDefinition::new("attributes.define", "attributes", "Define an attribute"),
        VerbDefinition::new("attributes.resolve", "attributes", "Resolve an attribute"),
        VerbDefinition::new("values.bind", "values", "Bind attribute values")
            .with_argument(ArgumentSpec::new("bind", ArgType::Any))
            .with_transition(["RESOURCES_PLANNED"], "ATTRIBUTES_BOUND")
            .with_example(r#"(values.bind (bind @attr{8a5d1a77:onboard.cbu_id} (value "CBU-1234")))"#),
        VerbDefinition::new("values.validate", "values", "Validate bound values").idempotent(),
        VerbDefinition::new("values.encrypt", "values", "Encrypt a bound value"),
        // Workflow
        VerbDefinition::new("workflow.transition", "workflow", "Activate the workflow")
            .with_argument(ArgumentSpec::new("from", ArgType::String))
            .with_argument(ArgumentSpec::new("to", ArgType::String))
            .with_transition(["ATTRIBUTES_BOUND"], "WORKFLOW_ACTIVE"),
        VerbDefinition::new("workflow.gate", "workflow", "Gate on a condition"),
        VerbDefinition::new("tasks.create", "tasks", "Create a task"),
        VerbDefinition::new("tasks.assign", "tasks", "Assign a task"),
        VerbDefinition::new("tasks.complete", "tasks", "Complete a task"),
    ]
}

pub fn vocabulary() -> VocabularyResult<DomainVocabulary> {
    DomainVocabulary::new(DOMAIN, verbs(), state_machine()?)
}

pub fn domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Client onboarding and case management", vocabulary()?)
        .with_grammar_rules(GRAMMAR_RULES)
        .with_template(
            None,
            "(case.create (cbu.id <cbu_id>) (nature-purpose <entity_name>))\n\n(products.add <products>)",
        )
        .with_template(Some("PRODUCTS_ADDED"), "(kyc.start (requirements <compliance_tier>))")
        .with_template(
            Some("KYC_STARTED"),
            "(services.discover (for.product <products>))",
        )
        .with_template(
            Some("SERVICES_DISCOVERED"),
            "(resources.plan (resource <products>))",
        ))
}
