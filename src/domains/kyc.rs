//! KYC Domains
//!
//! `kyc` covers Know Your Customer verification of the client entity:
//! document collection, identity verification, risk assessment and
//! sanctions screening. `trust-kyc` covers the trust-specific checks on
//! settlors, trustees and beneficiaries that run before trust UBO work.
//!
//! ## KYC State Machine:
//! INITIAL → DOCUMENTS_COLLECTED → IDENTITY_VERIFIED → RISK_ASSESSED →
//! COMPLIANCE_CHECKED → (UBO_DISCOVERED) → APPROVED
//!
//! Any non-terminal state may be rejected.

use super::Domain;
use crate::error::VocabularyResult;
use crate::vocabulary::{ArgType, ArgumentSpec, DomainStateMachine, DomainVocabulary, VerbDefinition};

pub const DOMAIN: &str = "kyc";
pub const TRUST_DOMAIN: &str = "trust-kyc";

const STATES: [&str; 8] = [
    "INITIAL",
    "DOCUMENTS_COLLECTED",
    "IDENTITY_VERIFIED",
    "RISK_ASSESSED",
    "COMPLIANCE_CHECKED",
    "UBO_DISCOVERED",
    "APPROVED",
    "REJECTED",
];

const OPEN_STATES: [&str; 6] = [
    "INITIAL",
    "DOCUMENTS_COLLECTED",
    "IDENTITY_VERIFIED",
    "RISK_ASSESSED",
    "COMPLIANCE_CHECKED",
    "UBO_DISCOVERED",
];

const KYC_TIERS: [&str; 3] = ["SIMPLIFIED", "STANDARD", "ENHANCED"];
const DOCUMENT_TYPES: [&str; 6] = [
    "PASSPORT",
    "NATIONAL_ID",
    "PROOF_OF_ADDRESS",
    "CERTIFICATE_OF_INCORPORATION",
    "TRUST_DEED",
    "FINANCIAL_STATEMENTS",
];

/// A KYC document may not be empty.
const GRAMMAR_RULES: &str = r#"
dsl_document -> expression+
"#;

fn state_machine() -> VocabularyResult<DomainStateMachine> {
    DomainStateMachine::new(
        DOMAIN,
        STATES,
        "INITIAL",
        [
            ("INITIAL", vec!["DOCUMENTS_COLLECTED", "REJECTED"]),
            ("DOCUMENTS_COLLECTED", vec!["IDENTITY_VERIFIED", "REJECTED"]),
            ("IDENTITY_VERIFIED", vec!["RISK_ASSESSED", "REJECTED"]),
            ("RISK_ASSESSED", vec!["COMPLIANCE_CHECKED", "REJECTED"]),
            ("COMPLIANCE_CHECKED", vec!["UBO_DISCOVERED", "APPROVED", "REJECTED"]),
            ("UBO_DISCOVERED", vec!["APPROVED", "REJECTED"]),
        ],
    )
}

fn verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("kyc.begin", "kyc", "Open a KYC review")
            .with_argument(ArgumentSpec::new("customer.id", ArgType::String).required())
            .with_argument(ArgumentSpec::new("kyc-tier", ArgType::Enum).with_enum(KYC_TIERS))
            .with_transition(Vec::<&str>::new(), "INITIAL")
            .with_example(r#"(kyc.begin (customer.id "CBU-1234") (kyc-tier "STANDARD"))"#),
        VerbDefinition::new("kyc.declare-entity", "kyc", "Declare the entity under review")
            .with_argument(ArgumentSpec::new("entity-type", ArgType::String))
            .with_argument(ArgumentSpec::new("jurisdiction", ArgType::String).with_pattern(r"^[A-Z]{2}$")),
        VerbDefinition::new("kyc.collect", "kyc", "Collect the documents the tier requires")
            .with_argument(ArgumentSpec::new("document", ArgType::Enum).with_enum(DOCUMENT_TYPES))
            .with_argument(ArgumentSpec::new("jurisdiction", ArgType::String))
            .with_transition(["INITIAL"], "DOCUMENTS_COLLECTED"),
        VerbDefinition::new("kyc.collect-doc", "kyc", "Collect a single additional document")
            .with_argument(ArgumentSpec::new("doc-type", ArgType::Enum).with_enum(DOCUMENT_TYPES)),
        VerbDefinition::new("kyc.verify", "kyc", "Verify identity against collected documents")
            .with_argument(ArgumentSpec::new("method", ArgType::String))
            .with_transition(["DOCUMENTS_COLLECTED"], "IDENTITY_VERIFIED"),
        VerbDefinition::new("kyc.assess", "kyc", "Assess customer risk")
            .with_argument(
                ArgumentSpec::new("risk-level", ArgType::Enum)
                    .with_enum(["LOW", "MEDIUM", "HIGH", "PROHIBITED"]),
            )
            .with_transition(["IDENTITY_VERIFIED"], "RISK_ASSESSED"),
        VerbDefinition::new("kyc.screen", "kyc", "Screen against sanctions and PEP lists")
            .with_argument(
                ArgumentSpec::new("list", ArgType::Enum)
                    .with_enum(["SANCTIONS", "PEP", "ADVERSE_MEDIA", "WORLDCHECK"]),
            )
            .with_transition(["RISK_ASSESSED"], "COMPLIANCE_CHECKED"),
        VerbDefinition::new("kyc.link-ubo", "kyc", "Link discovered beneficial owners to the review")
            .with_argument(ArgumentSpec::new("ubo", ArgType::Any))
            .with_transition(["COMPLIANCE_CHECKED"], "UBO_DISCOVERED"),
        VerbDefinition::new("kyc.approve", "kyc", "Approve the review")
            .with_argument(ArgumentSpec::new("approver", ArgType::String))
            .with_transition(["COMPLIANCE_CHECKED", "UBO_DISCOVERED"], "APPROVED"),
        VerbDefinition::new("kyc.reject", "kyc", "Reject the review")
            .with_argument(ArgumentSpec::new("reason", ArgType::String).required())
            .with_transition(OPEN_STATES, "REJECTED"),
        VerbDefinition::new("kyc.add-note", "kyc", "Attach a reviewer note").idempotent(),
    ]
}

pub fn vocabulary() -> VocabularyResult<DomainVocabulary> {
    DomainVocabulary::new(DOMAIN, verbs(), state_machine()?)
}

pub fn domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Know Your Customer verification", vocabulary()?)
        .with_grammar_rules(GRAMMAR_RULES)
        .with_template(
            None,
            "(kyc.begin (customer.id <cbu_id>) (kyc-tier <compliance_tier>))\n\n\
             (kyc.collect (document \"PASSPORT\") (jurisdiction <jurisdiction>))",
        )
        .with_template(
            Some("DOCUMENTS_COLLECTED"),
            "(kyc.verify (method \"DOCUMENTARY\"))",
        )
        .with_template(
            Some("IDENTITY_VERIFIED"),
            "(kyc.assess (risk-level <risk_profile>))",
        )
        .with_template(
            Some("RISK_ASSESSED"),
            "(kyc.screen (list \"SANCTIONS\"))",
        ))
}

const TRUST_STATES: [&str; 4] = ["INITIAL", "PARTIES_IDENTIFIED", "PARTIES_VERIFIED", "TRUST_VERIFIED"];

fn trust_state_machine() -> VocabularyResult<DomainStateMachine> {
    DomainStateMachine::new(
        TRUST_DOMAIN,
        TRUST_STATES,
        "INITIAL",
        [
            ("INITIAL", vec!["PARTIES_IDENTIFIED"]),
            ("PARTIES_IDENTIFIED", vec!["PARTIES_VERIFIED"]),
            ("PARTIES_VERIFIED", vec!["TRUST_VERIFIED"]),
        ],
    )
}

fn trust_verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("trust.begin", "trust", "Open a trust review")
            .with_argument(ArgumentSpec::new("trust-name", ArgType::String).required())
            .with_argument(ArgumentSpec::new("jurisdiction", ArgType::String))
            .with_transition(Vec::<&str>::new(), "INITIAL"),
        VerbDefinition::new("trust.identify-parties", "trust", "Identify settlors, trustees, protectors and beneficiaries")
            .with_argument(
                ArgumentSpec::new("roles", ArgType::Any)
                    .with_description("Party roles to identify"),
            )
            .with_transition(["INITIAL"], "PARTIES_IDENTIFIED"),
        VerbDefinition::new("trust.verify-parties", "trust", "Verify identified trust parties")
            .with_transition(["PARTIES_IDENTIFIED"], "PARTIES_VERIFIED"),
        VerbDefinition::new("trust.verify-deed", "trust", "Verify the trust deed")
            .with_argument(ArgumentSpec::new("deed-date", ArgType::String))
            .with_transition(["PARTIES_VERIFIED"], "TRUST_VERIFIED"),
        VerbDefinition::new("trust.add-party", "trust", "Add a party to the trust record")
            .with_argument(
                ArgumentSpec::new("role", ArgType::Enum)
                    .with_enum(["SETTLOR", "TRUSTEE", "PROTECTOR", "BENEFICIARY"])
                    .required(),
            ),
    ]
}

pub fn trust_vocabulary() -> VocabularyResult<DomainVocabulary> {
    DomainVocabulary::new(TRUST_DOMAIN, trust_verbs(), trust_state_machine()?)
}

pub fn trust_domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Trust party identification and deed verification", trust_vocabulary()?)
        .with_template(
            None,
            "(trust.begin (trust-name <entity_name>) (jurisdiction <jurisdiction>))\n\n\
             (trust.identify-parties (roles \"SETTLOR\" \"TRUSTEE\" \"BENEFICIARY\"))",
        )
        .with_template(Some("PARTIES_IDENTIFIED"), "(trust.verify-parties)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransitionError;
    use crate::parser::parse;

    #[test]
    fn test_kyc_happy_path_with_ubo_link() {
        let vocab = vocabulary().unwrap();
        let tree = parse(
            r#"(kyc.begin (customer.id "CBU-1") (kyc-tier "ENHANCED"))
               (kyc.collect (document "PASSPORT"))
               (kyc.verify)
               (kyc.assess (risk-level "HIGH"))
               (kyc.screen (list "PEP"))
               (kyc.link-ubo (ubo @attr{u-1}))
               (kyc.approve (approver "jdoe"))"#,
        )
        .unwrap();
        vocab.validate_arguments(&tree).unwrap();
        assert_eq!(
            vocab.plan_transitions(None, &tree).unwrap().as_deref(),
            Some("APPROVED")
        );
    }

    #[test]
    fn test_approve_requires_screening() {
        let vocab = vocabulary().unwrap();
        let err = vocab
            .apply_verb(Some("IDENTITY_VERIFIED"), "kyc.approve")
            .unwrap_err();
        assert!(matches!(err, TransitionError::VerbNotAllowed { .. }));
    }

    #[test]
    fn test_reject_from_any_open_state() {
        let vocab = vocabulary().unwrap();
        for state in OPEN_STATES {
            assert_eq!(
                vocab.apply_verb(Some(state), "kyc.reject").unwrap().as_deref(),
                Some("REJECTED")
            );
        }
        assert!(vocab.apply_verb(Some("APPROVED"), "kyc.reject").is_err());
    }

    #[test]
    fn test_tier_enum_enforced() {
        let vocab = vocabulary().unwrap();
        let tree = parse(r#"(kyc.begin (customer.id "CBU-1") (kyc-tier "GOLD"))"#).unwrap();
        assert!(vocab.validate_arguments(&tree).is_err());
    }

    #[test]
    fn test_trust_chain() {
        let vocab = trust_vocabulary().unwrap();
        let tree = parse(
            r#"(trust.begin (trust-name "Smith Family Trust"))
               (trust.identify-parties (roles "SETTLOR"))
               (trust.add-party (role "TRUSTEE"))
               (trust.verify-parties)
               (trust.verify-deed)"#,
        )
        .unwrap();
        vocab.validate_verbs(&tree).unwrap();
        vocab.validate_arguments(&tree).unwrap();
        assert_eq!(
            vocab.plan_transitions(None, &tree).unwrap().as_deref(),
            Some("TRUST_VERIFIED")
        );
    }
}
