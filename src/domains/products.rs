//! Product and Regulatory Domains
//!
//! Smaller domains brought in by the products a client takes up
//! (`custody`, `trading`, `compliance`) and by its jurisdiction
//! (`eu-compliance`, `us-compliance`). Each is a short linear workflow.

use super::Domain;
use crate::error::VocabularyResult;
use crate::vocabulary::{ArgType, ArgumentSpec, DomainStateMachine, DomainVocabulary, VerbDefinition};

/// Linear machine over `states`, each state leading to the next.
fn linear_machine(domain: &str, states: &[&str]) -> VocabularyResult<DomainStateMachine> {
    DomainStateMachine::new(
        domain,
        states.iter().copied(),
        states.first().copied().unwrap_or_default(),
        states.windows(2).map(|w| (w[0], vec![w[1]])),
    )
}

// Custody

const CUSTODY_STATES: [&str; 4] = ["SETUP", "ACCOUNTS_OPENED", "SSI_CONFIGURED", "ACTIVE"];

pub fn custody_vocabulary() -> VocabularyResult<DomainVocabulary> {
    let verbs = vec![
        VerbDefinition::new("custody.account-setup", "custody", "Start custody account setup")
            .with_argument(ArgumentSpec::new("client", ArgType::String).required())
            .with_transition(Vec::<&str>::new(), "SETUP"),
        VerbDefinition::new("custody.open-account", "custody", "Open safekeeping and cash accounts")
            .with_argument(
                ArgumentSpec::new("account-type", ArgType::Enum)
                    .with_enum(["SAFEKEEPING", "CASH", "OMNIBUS", "SEGREGATED"]),
            )
            .with_argument(ArgumentSpec::new("currency", ArgType::String).with_pattern(r"^[A-Z]{3}$"))
            .with_transition(["SETUP"], "ACCOUNTS_OPENED"),
        VerbDefinition::new("custody.configure-ssi", "custody", "Configure standing settlement instructions")
            .with_argument(ArgumentSpec::new("market", ArgType::String))
            .with_transition(["ACCOUNTS_OPENED"], "SSI_CONFIGURED"),
        VerbDefinition::new("custody.activate", "custody", "Activate custody services")
            .with_transition(["SSI_CONFIGURED"], "ACTIVE"),
    ];
    DomainVocabulary::new("custody", verbs, linear_machine("custody", &CUSTODY_STATES)?)
}

pub fn custody_domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Custody and safekeeping", custody_vocabulary()?)
        .with_template(
            None,
            "(custody.account-setup (client <cbu_id>))\n\n\
             (custody.open-account (account-type \"SAFEKEEPING\"))",
        )
        .with_template(Some("ACCOUNTS_OPENED"), "(custody.configure-ssi (market <jurisdiction>))")
        .with_template(Some("SSI_CONFIGURED"), "(custody.activate)"))
}

// Trading

const TRADING_STATES: [&str; 4] = ["PROFILE_CREATED", "LIMITS_SET", "VENUES_CONFIGURED", "ACTIVE"];

pub fn trading_vocabulary() -> VocabularyResult<DomainVocabulary> {
    let verbs = vec![
        VerbDefinition::new("trading.create-profile", "trading", "Create a trading profile")
            .with_argument(ArgumentSpec::new("client", ArgType::String).required())
            .with_transition(Vec::<&str>::new(), "PROFILE_CREATED"),
        VerbDefinition::new("trading.set-limits", "trading", "Set exposure and order limits")
            .with_argument(ArgumentSpec::new("max-order", ArgType::Number).with_range(Some(0.0), None))
            .with_argument(ArgumentSpec::new("daily-limit", ArgType::Number).with_range(Some(0.0), None))
            .with_transition(["PROFILE_CREATED"], "LIMITS_SET"),
        VerbDefinition::new("trading.configure-venues", "trading", "Configure execution venues")
            .with_argument(ArgumentSpec::new("venues", ArgType::Any))
            .with_transition(["LIMITS_SET"], "VENUES_CONFIGURED"),
        VerbDefinition::new("trading.activate", "trading", "Activate trading")
            .with_transition(["VENUES_CONFIGURED"], "ACTIVE"),
    ];
    DomainVocabulary::new("trading", verbs, linear_machine("trading", &TRADING_STATES)?)
}

pub fn trading_domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Trading and execution", trading_vocabulary()?)
        .with_template(
            None,
            "(trading.create-profile (client <cbu_id>))\n\n\
             (trading.set-limits (max-order 1000000))",
        )
        .with_template(Some("LIMITS_SET"), "(trading.configure-venues (venues \"XLON\"))"))
}

// Compliance

const COMPLIANCE_STATES: [&str; 4] = ["SCREENING", "SCREENED", "MONITORING", "REPORTING"];

pub fn compliance_vocabulary() -> VocabularyResult<DomainVocabulary> {
    let machine = DomainStateMachine::new(
        "compliance",
        COMPLIANCE_STATES,
        "SCREENING",
        [
            ("SCREENING", vec!["SCREENED"]),
            ("SCREENED", vec!["MONITORING"]),
            ("MONITORING", vec!["REPORTING"]),
            ("REPORTING", vec!["MONITORING"]),
        ],
    )?;
    let verbs = vec![
        VerbDefinition::new("compliance.open", "compliance", "Open a compliance file")
            .with_argument(ArgumentSpec::new("tier", ArgType::Enum).with_enum(["STANDARD", "ENHANCED"]))
            .with_transition(Vec::<&str>::new(), "SCREENING"),
        VerbDefinition::new("compliance.screen", "compliance", "Run regulatory screening")
            .with_transition(["SCREENING"], "SCREENED"),
        VerbDefinition::new("compliance.monitor", "compliance", "Start ongoing monitoring")
            .with_argument(
                ArgumentSpec::new("frequency", ArgType::Enum)
                    .with_enum(["DAILY", "WEEKLY", "MONTHLY", "QUARTERLY"]),
            )
            .with_transition(["SCREENED", "REPORTING"], "MONITORING"),
        VerbDefinition::new("compliance.report", "compliance", "File a periodic compliance report")
            .with_transition(["MONITORING"], "REPORTING"),
    ];
    DomainVocabulary::new("compliance", verbs, machine)
}

pub fn compliance_domain() -> VocabularyResult<Domain> {
    Ok(Domain::new("Regulatory compliance and reporting", compliance_vocabulary()?)
        .with_template(
            None,
            "(compliance.open (tier <compliance_tier>))\n\n(compliance.screen)",
        )
        .with_template(Some("SCREENED"), "(compliance.monitor (frequency \"MONTHLY\"))")
        .with_template(Some("MONITORING"), "(compliance.report)"))
}

// Jurisdictional regimes

const REGIME_STATES: [&str; 2] = ["ASSESSED", "FILED"];

fn regime_vocabulary(domain: &str, prefix: &str, regimes: &[&str]) -> VocabularyResult<DomainVocabulary> {
    let verbs = vec![
        VerbDefinition::new(format!("{}.assess-regime", prefix), prefix, "Assess applicable regulatory regimes")
            .with_argument(ArgumentSpec::new("regime", ArgType::Enum).with_enum(regimes.iter().copied()))
            .with_transition(Vec::<&str>::new(), "ASSESSED"),
        VerbDefinition::new(format!("{}.file-report", prefix), prefix, "File the regime's regulatory report")
            .with_argument(ArgumentSpec::new("report", ArgType::String))
            .with_transition(["ASSESSED"], "FILED"),
    ];
    DomainVocabulary::new(domain, verbs, linear_machine(domain, &REGIME_STATES)?)
}

pub fn eu_compliance_domain() -> VocabularyResult<Domain> {
    let vocabulary = regime_vocabulary("eu-compliance", "eu", &["AIFMD", "UCITS", "MIFID2", "GDPR"])?;
    Ok(Domain::new("EU regulatory regimes", vocabulary)
        .with_template(None, "(eu.assess-regime (regime \"AIFMD\"))")
        .with_template(Some("ASSESSED"), "(eu.file-report (report \"ANNEX_IV\"))"))
}

pub fn us_compliance_domain() -> VocabularyResult<Domain> {
    let vocabulary = regime_vocabulary("us-compliance", "us", &["FATCA", "SEC", "FINCEN", "CFTC"])?;
    Ok(Domain::new("US regulatory regimes", vocabulary)
        .with_template(None, "(us.assess-regime (regime \"FATCA\"))")
        .with_template(Some("ASSESSED"), "(us.file-report (report \"FORM_PF\"))"))
}
