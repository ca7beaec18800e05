//! Instruction routing across the domains of an orchestration

/// Domain keywords, matched case-insensitively as substrings
pub const ROUTING_TABLE: &[(&str, &[&str])] = &[
    ("onboarding", &["case", "cbu", "onboard", "client"]),
    (
        "kyc",
        &["kyc", "know your customer", "identity", "verification", "document", "passport"],
    ),
    (
        "ubo",
        &["ubo", "beneficial owner", "ownership", "shareholder", "trust", "beneficiary"],
    ),
    (
        "hedge-fund-investor",
        &["investor", "investment", "subscription", "fund", "hedge", "accredited"],
    ),
    (
        "compliance",
        &["compliance", "regulatory", "report", "filing", "regulation"],
    ),
    (
        "custody",
        &["custody", "safekeeping", "asset", "securities", "account"],
    ),
    ("trading", &["trade", "execution", "order", "market", "buy", "sell"]),
];

fn keywords_for(domain: &str) -> &'static [&'static str] {
    ROUTING_TABLE
        .iter()
        .find(|(name, _)| *name == domain)
        .map(|(_, keywords)| *keywords)
        .unwrap_or_default()
}

/// Active domains (in sorted order) whose keywords appear in `instruction`.
/// Falls back to `primary` when nothing matches.
pub fn route(instruction: &str, active_domains: &[String], primary: &str) -> Vec<String> {
    let instruction = instruction.to_lowercase();
    let mut active: Vec<&String> = active_domains.iter().collect();
    active.sort();
    active.dedup();

    let targets: Vec<String> = active
        .into_iter()
        .filter(|domain| {
            keywords_for(domain)
                .iter()
                .any(|keyword| instruction.contains(keyword))
        })
        .cloned()
        .collect();

    if targets.is_empty() {
        vec![primary.to_string()]
    } else {
        targets
    }
}

/// Domain owning a named workflow component
pub fn map_component_to_domain(component: &str) -> String {
    if component == "entity" {
        return "onboarding".to_string();
    }
    if let Some(product) = component.strip_prefix("product_") {
        return product.to_string();
    }
    if component.starts_with("compliance_") {
        return "compliance".to_string();
    }
    component.to_string()
}
