//! UBO Domain
//!
//! Ultimate Beneficial Ownership discovery: entity data collection,
//! ownership mapping, threshold analysis and identity verification of the
//! natural persons at the top of the structure.
//!
//! ## State Machine:
//! INITIAL → ENTITIES_DECLARED → RELATIONSHIPS_MAPPED → OWNERSHIP_CALCULATED →
//! THRESHOLDS_ANALYZED → COMPLIANCE_VERIFIED → UBO_IDENTIFIED
//!
//! Recursive resolution of intermediate holding entities returns the
//! workflow to ENTITIES_DECLARED.

use super::Domain;
use crate::error::VocabularyResult;
use crate::vocabulary::{ArgType, ArgumentSpec, DomainStateMachine, DomainVocabulary, VerbDefinition};

pub const DOMAIN: &str = "ubo";

const STATES: [&str; 7] = [
    "INITIAL",
    "ENTITIES_DECLARED",
    "RELATIONSHIPS_MAPPED",
    "OWNERSHIP_CALCULATED",
    "THRESHOLDS_ANALYZED",
    "COMPLIANCE_VERIFIED",
    "UBO_IDENTIFIED",
];

fn state_machine() -> VocabularyResult<DomainStateMachine> {
    DomainStateMachine::new(
        DOMAIN,
        STATES,
        "INITIAL",
        [
            ("INITIAL", vec!["ENTITIES_DECLARED"]),
            ("ENTITIES_DECLARED", vec!["RELATIONSHIPS_MAPPED"]),
            ("RELATIONSHIPS_MAPPED", vec!["OWNERSHIP_CALCULATED", "ENTITIES_DECLARED"]),
            ("OWNERSHIP_CALCULATED", vec!["THRESHOLDS_ANALYZED", "ENTITIES_DECLARED"]),
            ("THRESHOLDS_ANALYZED", vec!["COMPLIANCE_VERIFIED"]),
            ("COMPLIANCE_VERIFIED", vec!["UBO_IDENTIFIED"]),
        ],
    )
}

fn entity_ref() -> ArgumentSpec {
    ArgumentSpec::new("entity.id", ArgType::Any).with_description("Entity under analysis")
}

fn verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("ubo.start", "ubo", "Open a beneficial ownership analysis")
            .with_argument(entity_ref().required())
            .with_transition(Vec::<&str>::new(), "INITIAL"),
        VerbDefinition::new("ubo.collect-entity-data", "ubo", "Collect registry data for the entity")
            .with_argument(entity_ref())
            .with_argument(ArgumentSpec::new("jurisdiction", ArgType::String))
            .with_argument(ArgumentSpec::new("entity-type", ArgType::String))
            .with_transition(["INITIAL"], "ENTITIES_DECLARED"),
        VerbDefinition::new("ubo.get-ownership-structure", "ubo", "Map ownership relationships")
            .with_argument(entity_ref())
            .with_argument(ArgumentSpec::new("depth-limit", ArgType::Number).with_range(Some(1.0), Some(10.0)))
            .with_transition(["ENTITIES_DECLARED"], "RELATIONSHIPS_MAPPED"),
        VerbDefinition::new("ubo.identify-ownership-prong", "ubo", "Calculate effective ownership percentages")
            .with_argument(entity_ref())
            .with_transition(["RELATIONSHIPS_MAPPED"], "OWNERSHIP_CALCULATED"),
        VerbDefinition::new("ubo.recursive-entity-resolve", "ubo", "Resolve an intermediate holding entity")
            .with_argument(entity_ref())
            .with_transition(["RELATIONSHIPS_MAPPED", "OWNERSHIP_CALCULATED"], "ENTITIES_DECLARED"),
        VerbDefinition::new("ubo.resolve-ubos", "ubo", "Apply ownership thresholds")
            .with_argument(entity_ref())
            .with_argument(
                ArgumentSpec::new("ownership-threshold", ArgType::Number)
                    .with_range(Some(0.0), Some(100.0)),
            )
            .with_argument(ArgumentSpec::new("jurisdiction-rules", ArgType::String))
            .with_transition(["OWNERSHIP_CALCULATED"], "THRESHOLDS_ANALYZED")
            .with_example(r#"(ubo.resolve-ubos (entity.id @attr{entity-uuid}) (ownership-threshold 25.0))"#),
        VerbDefinition::new("ubo.verify-identity", "ubo", "Verify the identity of each beneficial owner")
            .with_argument(ArgumentSpec::new("ubo.id", ArgType::Any))
            .with_argument(
                ArgumentSpec::new("verification-level", ArgType::Enum)
                    .with_enum(["SIMPLIFIED", "STANDARD", "ENHANCED"]),
            )
            .with_transition(["THRESHOLDS_ANALYZED"], "COMPLIANCE_VERIFIED"),
        VerbDefinition::new("ubo.assess-risk", "ubo", "Assess the overall ownership risk")
            .with_argument(entity_ref())
            .with_transition(["COMPLIANCE_VERIFIED"], "UBO_IDENTIFIED"),
        VerbDefinition::new("ubo.screen-person", "ubo", "Screen a beneficial owner against watchlists")
            .with_argument(ArgumentSpec::new("ubo.id", ArgType::Any))
            .with_argument(ArgumentSpec::new("screening-lists", ArgType::Any)),
        VerbDefinition::new("ubo.identify-trust-parties", "ubo", "Identify trust parties as ownership nodes")
            .with_argument(entity_ref()),
        VerbDefinition::new("ubo.resolve-trust-ubos", "ubo", "Resolve trust beneficial owners without thresholds")
            .with_argument(entity_ref()),
        VerbDefinition::new("ubo.resolve-partnership-ubos", "ubo", "Resolve general and limited partner owners")
            .with_argument(entity_ref()),
        VerbDefinition::new("ubo.identify-fincen-control-roles", "ubo", "Identify FinCEN control persons")
            .with_argument(entity_ref()),
        VerbDefinition::new("ubo.apply-fincen-control-prong", "ubo", "Apply the FinCEN control prong")
            .with_argument(entity_ref()),
        VerbDefinition::new("ubo.monitor-changes", "ubo", "Monitor the ownership structure for changes")
            .with_argument(
                ArgumentSpec::new("monitoring-frequency", ArgType::Enum)
                    .with_enum(["DAILY", "WEEKLY", "MONTHLY", "QUARTERLY"]),
            )
            .idempotent(),
    ]
}

pub fn vocabulary() -> VocabularyResult<DomainVocabulary> {
    DomainVocabulary::new(DOMAIN, verbs(), state_machine()?)
}

pub fn domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Ultimate Beneficial Ownership discovery", vocabulary()?)
        .with_template(
            None,
            "(ubo.start (entity.id <entity_id>))\n\n\
             (ubo.collect-entity-data (entity.id <entity_id>) (jurisdiction <jurisdiction>) (entity-type <entity_type>))",
        )
        .with_template(
            Some("ENTITIES_DECLARED"),
            "(ubo.get-ownership-structure (entity.id <entity_id>) (depth-limit 5))",
        )
        .with_template(
            Some("RELATIONSHIPS_MAPPED"),
            "(ubo.identify-ownership-prong (entity.id <entity_id>))",
        )
        .with_template(
            Some("OWNERSHIP_CALCULATED"),
            "(ubo.resolve-ubos (entity.id <entity_id>) (ownership-threshold 25.0))",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_recursive_resolution_returns_to_declared() {
        let vocab = vocabulary().unwrap();
        let tree = parse(
            r#"(ubo.start (entity.id "E-1"))
               (ubo.collect-entity-data (entity.id "E-1"))
               (ubo.get-ownership-structure (entity.id "E-1") (depth-limit 5))
               (ubo.recursive-entity-resolve (entity.id "HOLDCO-2"))
               (ubo.get-ownership-structure (entity.id "HOLDCO-2"))
               (ubo.identify-ownership-prong (entity.id "E-1"))
               (ubo.resolve-ubos (entity.id "E-1") (ownership-threshold 25.0))
               (ubo.verify-identity (ubo.id @attr{ubo-1}) (verification-level "ENHANCED"))
               (ubo.screen-person (ubo.id @attr{ubo-1}))
               (ubo.assess-risk (entity.id "E-1"))"#,
        )
        .unwrap();
        vocab.validate_verbs(&tree).unwrap();
        vocab.validate_arguments(&tree).unwrap();
        assert_eq!(
            vocab.plan_transitions(None, &tree).unwrap().as_deref(),
            Some("UBO_IDENTIFIED")
        );
    }

    #[test]
    fn test_threshold_range() {
        let vocab = vocabulary().unwrap();
        let tree = parse(r#"(ubo.resolve-ubos (ownership-threshold 125))"#).unwrap();
        assert!(vocab.validate_arguments(&tree).is_err());
    }

    #[test]
    fn test_cannot_skip_mapping() {
        let vocab = vocabulary().unwrap();
        assert!(vocab
            .apply_verb(Some("ENTITIES_DECLARED"), "ubo.resolve-ubos")
            .is_err());
        assert_eq!(
            vocab.state_machine().terminal_states(),
            vec!["UBO_IDENTIFIED"]
        );
    }
}
