//! Hedge Fund Investor Domain
//!
//! The investor lifecycle for a hedge fund register: opportunity, investor
//! KYC, subscription, cash, unit issuance and redemption.
//!
//! ## State Machine:
//! OPPORTUNITY → KYC_PENDING → KYC_APPROVED → SUB_PENDING_CASH →
//! FUNDED_PENDING_NAV → ISSUED → ACTIVE → REDEEM_PENDING → REDEEMED → OFFBOARDED
//!
//! Active investors may top up, which re-enters SUB_PENDING_CASH.

use super::Domain;
use crate::error::VocabularyResult;
use crate::vocabulary::{ArgType, ArgumentSpec, DomainStateMachine, DomainVocabulary, VerbDefinition};

pub const DOMAIN: &str = "hedge-fund-investor";

const STATES: [&str; 10] = [
    "OPPORTUNITY",
    "KYC_PENDING",
    "KYC_APPROVED",
    "SUB_PENDING_CASH",
    "FUNDED_PENDING_NAV",
    "ISSUED",
    "ACTIVE",
    "REDEEM_PENDING",
    "REDEEMED",
    "OFFBOARDED",
];

const INVESTOR_TYPES: [&str; 4] = ["PROPER_PERSON", "CORPORATE", "TRUST", "FOHF"];

fn state_machine() -> VocabularyResult<DomainStateMachine> {
    DomainStateMachine::new(
        DOMAIN,
        STATES,
        "OPPORTUNITY",
        [
            ("OPPORTUNITY", vec!["KYC_PENDING"]),
            ("KYC_PENDING", vec!["KYC_APPROVED"]),
            ("KYC_APPROVED", vec!["SUB_PENDING_CASH"]),
            ("SUB_PENDING_CASH", vec!["FUNDED_PENDING_NAV"]),
            ("FUNDED_PENDING_NAV", vec!["ISSUED"]),
            ("ISSUED", vec!["ACTIVE"]),
            ("ACTIVE", vec!["SUB_PENDING_CASH", "REDEEM_PENDING"]),
            ("REDEEM_PENDING", vec!["REDEEMED"]),
            ("REDEEMED", vec!["OFFBOARDED"]),
        ],
    )
}

fn amount() -> ArgumentSpec {
    ArgumentSpec::new("amount", ArgType::Number).with_range(Some(0.0), None)
}

fn verbs() -> Vec<VerbDefinition> {
    vec![
        VerbDefinition::new("investor.start-opportunity", "investor_lifecycle", "Start investor opportunity process")
            .with_argument(ArgumentSpec::new("investor", ArgType::String).required())
            .with_argument(ArgumentSpec::new("legal-name", ArgType::String).required())
            .with_argument(ArgumentSpec::new("investor-type", ArgType::Enum).with_enum(INVESTOR_TYPES))
            .with_argument(ArgumentSpec::new("domicile", ArgType::String).with_pattern(r"^[A-Z]{2}$"))
            .with_transition(Vec::<&str>::new(), "OPPORTUNITY")
            .with_example(
                r#"(investor.start-opportunity (investor "INV-001") (legal-name "Acme Capital LP") (investor-type "CORPORATE") (domicile "LU"))"#,
            ),
        VerbDefinition::new("investor.begin-kyc", "compliance", "Begin KYC process for investor")
            .with_argument(
                ArgumentSpec::new("kyc-tier", ArgType::Enum)
                    .with_enum(["SIMPLIFIED", "STANDARD", "ENHANCED"]),
            )
            .with_transition(["OPPORTUNITY"], "KYC_PENDING"),
        VerbDefinition::new("investor.approve-kyc", "compliance", "Approve investor KYC")
            .with_transition(["KYC_PENDING"], "KYC_APPROVED"),
        VerbDefinition::new("investor.amend-details", "investor_lifecycle", "Amend investor static data")
            .idempotent(),
        VerbDefinition::new("subscription.submit", "investment", "Submit a subscription order")
            .with_argument(ArgumentSpec::new("investor", ArgType::String))
            .with_argument(ArgumentSpec::new("fund", ArgType::String).required())
            .with_argument(ArgumentSpec::new("class", ArgType::String))
            .with_argument(amount())
            .with_transition(["KYC_APPROVED", "ACTIVE"], "SUB_PENDING_CASH"),
        VerbDefinition::new("cash.confirm", "investment", "Confirm subscription cash received")
            .with_argument(amount())
            .with_transition(["SUB_PENDING_CASH"], "FUNDED_PENDING_NAV"),
        VerbDefinition::new("units.issue", "investment", "Issue units at the dealing NAV")
            .with_argument(ArgumentSpec::new("nav-per-share", ArgType::Number).with_range(Some(0.0), None))
            .with_argument(ArgumentSpec::new("units", ArgType::Number).with_range(Some(0.0), None))
            .with_transition(["FUNDED_PENDING_NAV"], "ISSUED"),
        VerbDefinition::new("investor.activate", "investor_lifecycle", "Activate the investor on the register")
            .with_transition(["ISSUED"], "ACTIVE"),
        VerbDefinition::new("trade.execute", "investment", "Execute trade for investor")
            .with_argument(
                ArgumentSpec::new("trade-type", ArgType::Enum)
                    .with_enum(["SUBSCRIPTION", "REDEMPTION", "SWITCH"])
                    .required(),
            )
            .with_argument(amount()),
        VerbDefinition::new("redemption.request", "investment", "Request a redemption")
            .with_argument(ArgumentSpec::new("units", ArgType::Number).with_range(Some(0.0), None))
            .with_argument(ArgumentSpec::new("percentage", ArgType::Number).with_range(Some(0.0), Some(100.0)))
            .with_transition(["ACTIVE"], "REDEEM_PENDING"),
        VerbDefinition::new("redemption.settle", "investment", "Settle redemption proceeds")
            .with_transition(["REDEEM_PENDING"], "REDEEMED"),
        VerbDefinition::new("investor.offboard", "investor_lifecycle", "Offboard a fully redeemed investor")
            .with_transition(["REDEEMED"], "OFFBOARDED"),
    ]
}

pub fn vocabulary() -> VocabularyResult<DomainVocabulary> {
    DomainVocabulary::new(DOMAIN, verbs(), state_machine()?)
}

pub fn domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Hedge fund investor lifecycle", vocabulary()?)
        .with_template(
            None,
            "(investor.start-opportunity (investor <investor_id>) (legal-name <entity_name>) \
             (investor-type <entity_type>) (domicile <jurisdiction>))\n\n\
             (investor.begin-kyc (kyc-tier <compliance_tier>))",
        )
        .with_template(Some("KYC_PENDING"), "(investor.approve-kyc)")
        .with_template(
            Some("KYC_APPROVED"),
            "(subscription.submit (investor <investor_id>) (fund <fund_id>))",
        )
        .with_template(Some("ACTIVE"), "(redemption.request (percentage 100))"))
}
