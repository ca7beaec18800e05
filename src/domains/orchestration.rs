//! Orchestration Domain
//!
//! Verbs that describe a multi-domain run itself rather than any one
//! business domain: session initialization, context analysis, planning,
//! cross-domain state sharing, sub-workflow execution and product
//! requirements. The orchestrator writes its header in this vocabulary and
//! validates it before composition starts.
//!
//! ## State Machine:
//! INITIALIZED → CONTEXT_ANALYZED → DOMAINS_DETERMINED → PLANNED →
//! EXECUTING → COMPLETED

use super::Domain;
use crate::error::VocabularyResult;
use crate::vocabulary::{ArgType, ArgumentSpec, DomainStateMachine, DomainVocabulary, VerbDefinition};

pub const DOMAIN: &str = "orchestration";

const STATES: [&str; 6] = [
    "INITIALIZED",
    "CONTEXT_ANALYZED",
    "DOMAINS_DETERMINED",
    "PLANNED",
    "EXECUTING",
    "COMPLETED",
];

/// Headers are plain verb lists; no comments or scalars at the top level.
const GRAMMAR_RULES: &str = r#"
dsl_document -> expression+
"#;

fn state_machine() -> VocabularyResult<DomainStateMachine> {
    DomainStateMachine::new(
        DOMAIN,
        STATES,
        "INITIALIZED",
        [
            ("INITIALIZED", vec!["CONTEXT_ANALYZED"]),
            ("CONTEXT_ANALYZED", vec!["DOMAINS_DETERMINED"]),
            ("DOMAINS_DETERMINED", vec!["PLANNED"]),
            ("PLANNED", vec!["EXECUTING"]),
            ("EXECUTING", vec!["EXECUTING", "COMPLETED"]),
        ],
    )
}

fn arg(name: &str, arg_type: ArgType) -> ArgumentSpec {
    ArgumentSpec::new(name, arg_type)
}

fn context_verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("orchestration.initialize", "context", "Open an orchestration session for an entity")
            .with_argument(arg("session.id", ArgType::String).required())
            .with_argument(arg("cbu.id", ArgType::String).required())
            .with_argument(arg("entity.name", ArgType::String).required())
            .with_argument(arg("entity.type", ArgType::String).required())
            .with_argument(arg("jurisdiction", ArgType::String).required())
            .with_argument(arg("products", ArgType::Any).required())
            .with_transition(Vec::<&str>::new(), "INITIALIZED")
            .with_example(
                r#"(orchestration.initialize (session.id "S-1") (cbu.id "CBU-1234") (entity.name "ACME Ltd")
                    (entity.type "CORPORATE") (jurisdiction "LU") (products "CUSTODY"))"#,
            ),
        VerbDefinition::new("orchestration.context.analyze", "context", "Record the analysis of the request")
            .with_argument(arg("entity.type", ArgType::String).required())
            .with_argument(arg("products", ArgType::Any).required())
            .with_argument(arg("jurisdiction", ArgType::String).required())
            .with_argument(
                arg("complexity.assessment", ArgType::Enum).with_enum(["LOW", "MEDIUM", "HIGH"]),
            )
            .with_argument(arg("compliance.tier", ArgType::String))
            .with_transition(["INITIALIZED"], "CONTEXT_ANALYZED"),
        VerbDefinition::new("orchestration.domains.determine", "context", "Record the domains the run needs")
            .with_argument(arg("primary.domain", ArgType::String).required())
            .with_argument(arg("required.domains", ArgType::Any).required())
            .with_transition(["CONTEXT_ANALYZED"], "DOMAINS_DETERMINED"),
        VerbDefinition::new("orchestration.execution.plan", "execution", "Record the staged execution plan")
            .with_argument(arg("session.id", ArgType::String).required())
            .with_argument(arg("total.stages", ArgType::Number).required().with_range(Some(0.0), None))
            .with_argument(arg("stage", ArgType::Any))
            .with_transition(["DOMAINS_DETERMINED"], "PLANNED"),
    ]
}

fn state_verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("state.initialize.shared", "state", "Seed shared state visible to every domain")
            .with_argument(arg("attributes", ArgType::Any).required())
            .idempotent(),
        VerbDefinition::new("state.share.cross.domain", "state", "Share attributes from one domain with others")
            .with_argument(arg("from.domain", ArgType::String).required())
            .with_argument(arg("to.domains", ArgType::Any).required())
            .with_argument(arg("attributes", ArgType::Any).required())
            .with_argument(arg("access.mode", ArgType::Enum).with_enum(["READ_ONLY", "READ_WRITE"]))
            .with_argument(arg("sync.strategy", ArgType::String)),
        VerbDefinition::new("state.sync.attributes", "state", "Keep attribute values in step across domains")
            .with_argument(arg("attributes", ArgType::Any).required())
            .with_argument(arg("between.domains", ArgType::Any).required())
            .with_argument(
                arg("conflict.resolution", ArgType::Enum)
                    .with_enum(["SOURCE_WINS", "TIMESTAMP_WINS", "MERGE_VALUES"]),
            )
            .with_argument(arg("validation.required", ArgType::Boolean)),
        VerbDefinition::new("state.validate.consistency", "state", "Check shared attributes agree across domains")
            .with_argument(arg("attributes", ArgType::Any).required())
            .with_argument(arg("across.domains", ArgType::Any))
            .idempotent(),
    ]
}

fn workflow_verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("workflow.execute.subdomain", "workflow", "Run one domain's workflow for an entity")
            .with_argument(arg("domain", ArgType::String).required())
            .with_argument(arg("entity.target", ArgType::Any).required())
            .with_argument(arg("template", ArgType::String))
            .with_argument(arg("depends.on", ArgType::Any))
            .with_argument(arg("result.binding", ArgType::Any))
            .with_argument(arg("context.data", ArgType::Any))
            .with_transition(["PLANNED", "EXECUTING"], "EXECUTING"),
        VerbDefinition::new("workflow.coordinate.parallel", "workflow", "Run domain workflows side by side")
            .with_argument(arg("workflows", ArgType::Any).required())
            .with_argument(arg("sync.points", ArgType::Any).required())
            .with_argument(arg("timeout", ArgType::String))
            .with_argument(
                arg("failure.strategy", ArgType::Enum).with_enum(["FAIL_FAST", "CONTINUE", "RETRY"]),
            )
            .with_transition(["PLANNED", "EXECUTING"], "EXECUTING"),
        VerbDefinition::new("workflow.wait.for.completion", "workflow", "Wait for the running workflows")
            .with_argument(arg("workflows", ArgType::Any).required())
            .with_argument(arg("timeout", ArgType::String))
            .with_transition(["EXECUTING"], "COMPLETED"),
        VerbDefinition::new(
            "workflow.apply.product.requirements",
            "workflow",
            "Apply a product's required operations to entities",
        )
        .with_argument(arg("products", ArgType::Any).required())
        .with_argument(arg("to.entities", ArgType::Any).required())
        .with_argument(arg("depends.on", ArgType::Any))
        .with_argument(arg("customizations", ArgType::Any)),
    ]
}

fn communication_verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("domain.route.to", "communication", "Route a DSL fragment to a domain")
            .with_argument(arg("domain", ArgType::String).required())
            .with_argument(arg("dsl.fragment", ArgType::String).required())
            .with_argument(arg("context", ArgType::Any))
            .with_argument(arg("priority", ArgType::Enum).with_enum(["LOW", "NORMAL", "HIGH"]))
            .with_argument(arg("correlation.id", ArgType::String)),
        VerbDefinition::new("domain.collect.results", "communication", "Collect and bind results from domains")
            .with_argument(arg("from.domains", ArgType::Any).required())
            .with_argument(arg("result.binding", ArgType::Any).required())
            .with_argument(arg("aggregation.strategy", ArgType::String))
            .with_argument(arg("timeout", ArgType::String)),
        VerbDefinition::new("domain.broadcast.state", "communication", "Tell domains about changed attributes")
            .with_argument(arg("attributes", ArgType::Any).required())
            .with_argument(arg("to.domains", ArgType::Any).required())
            .with_argument(arg("change.type", ArgType::String))
            .with_argument(arg("immediate", ArgType::Boolean)),
    ]
}

fn product_verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new(
            "products.validate.compatibility",
            "products",
            "Check products against entity types and jurisdictions",
        )
        .with_argument(arg("entities", ArgType::Any).required())
        .with_argument(arg("products", ArgType::Any).required())
        .with_argument(arg("entity.type", ArgType::String))
        .with_argument(arg("jurisdictions", ArgType::Any))
        .with_argument(arg("compliance.tier", ArgType::String))
        .idempotent(),
        VerbDefinition::new(
            "products.configure.cross.domain",
            "products",
            "Configure product requirements across domains",
        )
        .with_argument(arg("products", ArgType::Any).required())
        .with_argument(arg("configuration", ArgType::Any).required())
        .with_argument(arg("affected.domains", ArgType::Any).required())
        .with_argument(arg("dependencies", ArgType::Any)),
    ]
}

fn verbs() -> Vec<VerbDefinition> {
    let mut verbs = context_verbs();
    verbs.extend(state_verbs());
    verbs.extend(workflow_verbs());
    verbs.extend(communication_verbs());
    verbs.extend(product_verbs());
    verbs
}

pub fn vocabulary() -> VocabularyResult<DomainVocabulary> {
    DomainVocabulary::new(DOMAIN, verbs(), state_machine()?)
}

pub fn domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Cross-domain orchestration", vocabulary()?)
        .with_grammar_rules(GRAMMAR_RULES)
        .with_template(
            None,
            "(orchestration.initialize (session.id <session_id>) (cbu.id <cbu_id>) \
             (entity.name <entity_name>) (entity.type <entity_type>) \
             (jurisdiction <jurisdiction>) (products <products>))",
        ))
}
