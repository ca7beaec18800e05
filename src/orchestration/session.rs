//! Orchestration sessions: one unified DSL document built from the
//! contributions of several domain sessions.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use tracing::debug;

use super::analysis::{Complexity, ContextAnalysis, OrchestrationRequest};
use super::lifecycle::LifecycleState;
use super::plan::ExecutionPlan;
use super::products::ProductCatalog;
use crate::error::{OrchestrationResult, SessionError, TransitionResult};
use crate::placeholder::resolver::quote;
use crate::session::{append_fragment, FRAGMENT_SEPARATOR};

/// One domain's part in an orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSession {
    pub domain: String,
    pub session_id: String,
    pub state: LifecycleState,
    /// Business state in the domain's own machine
    pub domain_state: Option<String>,
    pub contributed_dsl: String,
    pub dependencies: Vec<String>,
    pub last_activity: DateTime<Utc>,
}

impl DomainSession {
    pub fn new(domain: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            domain: domain.into(),
            session_id: Uuid::new_v4().to_string(),
            state: LifecycleState::Created,
            domain_state: None,
            contributed_dsl: String::new(),
            dependencies,
            last_activity: Utc::now(),
        }
    }
}

/// Data every domain can see
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedContext {
    pub cbu_id: Option<String>,
    pub investor_id: Option<String>,
    pub fund_id: Option<String>,
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_name: Option<String>,
    pub jurisdiction: Option<String>,
    pub products: Vec<String>,
    pub services: Vec<String>,
    pub workflow_type: Option<String>,
    pub risk_profile: Option<String>,
    pub compliance_tier: Option<String>,
    /// Values bound to attribute ids by contributed fragments
    pub attribute_values: BTreeMap<String, Value>,
    pub data: BTreeMap<String, Value>,
}

impl SharedContext {
    pub fn from_request(request: &OrchestrationRequest, analysis: &ContextAnalysis) -> Self {
        Self {
            cbu_id: request.cbu_id.clone(),
            investor_id: request.investor_id.clone(),
            fund_id: request.fund_id.clone(),
            entity_id: request.entity_id.clone(),
            entity_type: request.entity_type.clone(),
            entity_name: request.entity_name.clone(),
            jurisdiction: request.jurisdiction.clone(),
            products: request.products.clone(),
            services: request.services.clone(),
            workflow_type: request.workflow_type.clone(),
            risk_profile: request.risk_profile.clone(),
            compliance_tier: Some(analysis.compliance_tier.clone()),
            attribute_values: BTreeMap::new(),
            data: request
                .initial_context
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Flat view: `data`, then attribute values by id, then the set fields.
    /// Unset fields and empty lists are left out.
    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut map: HashMap<String, Value> = self
            .data
            .iter()
            .chain(self.attribute_values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let fields = [
            ("cbu_id", &self.cbu_id),
            ("investor_id", &self.investor_id),
            ("fund_id", &self.fund_id),
            ("entity_id", &self.entity_id),
            ("entity_type", &self.entity_type),
            ("entity_name", &self.entity_name),
            ("jurisdiction", &self.jurisdiction),
            ("workflow_type", &self.workflow_type),
            ("risk_profile", &self.risk_profile),
            ("compliance_tier", &self.compliance_tier),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        for (key, list) in [("products", &self.products), ("services", &self.services)] {
            if !list.is_empty() {
                map.insert(key.to_string(), Value::from(list.clone()));
            }
        }
        map
    }
}

/// Where one contribution sits inside the unified document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSegment {
    pub domain: String,
    pub stage: String,
    /// Byte offsets into `unified_dsl`
    pub start: usize,
    pub end: usize,
    /// Document version this contribution produced
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// `None` for the orchestration itself
    pub domain: Option<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationSession {
    pub session_id: String,
    pub primary_domain: String,
    pub domain_sessions: BTreeMap<String, DomainSession>,
    pub shared_context: SharedContext,
    pub execution_plan: ExecutionPlan,
    /// Validated `orchestration` domain header describing the run; empty
    /// until the first composition
    #[serde(default)]
    pub orchestration_dsl: String,
    pub unified_dsl: String,
    pub version: u64,
    pub segments: Vec<DocumentSegment>,
    pub current_state: LifecycleState,
    pub state_history: Vec<StateChange>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl OrchestrationSession {
    pub fn new(
        session_id: impl Into<String>,
        request: &OrchestrationRequest,
        analysis: &ContextAnalysis,
        execution_plan: ExecutionPlan,
    ) -> Self {
        let domain_sessions = analysis
            .required_domains
            .iter()
            .map(|domain| {
                let deps = analysis.dependencies.get(domain).cloned().unwrap_or_default();
                (domain.clone(), DomainSession::new(domain.clone(), deps))
            })
            .collect();
        let now = Utc::now();

        Self {
            session_id: session_id.into(),
            primary_domain: analysis.primary_domain.clone(),
            domain_sessions,
            shared_context: SharedContext::from_request(request, analysis),
            execution_plan,
            orchestration_dsl: String::new(),
            unified_dsl: String::new(),
            version: 0,
            segments: Vec::new(),
            current_state: LifecycleState::Created,
            state_history: Vec::new(),
            created_at: now,
            last_used: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }

    pub fn idle_for(&self) -> Duration {
        (Utc::now() - self.last_used).to_std().unwrap_or_default()
    }

    pub fn domain_session(&self, domain: &str) -> OrchestrationResult<&DomainSession> {
        self.domain_sessions
            .get(domain)
            .ok_or_else(|| self.not_active(domain).into())
    }

    fn not_active(&self, domain: &str) -> SessionError {
        SessionError::DomainNotActive {
            session_id: self.session_id.clone(),
            domain: domain.to_string(),
        }
    }

    /// Every domain taking part, sorted
    pub fn active_domains(&self) -> Vec<String> {
        self.domain_sessions.keys().cloned().collect()
    }

    /// Move the orchestration to `to` and record the change
    pub fn transition(&mut self, to: LifecycleState, reason: impl Into<String>) -> TransitionResult<()> {
        let from = self.current_state;
        from.validate_transition(to)?;
        self.current_state = to;
        self.state_history.push(StateChange {
            from,
            to,
            domain: None,
            reason: reason.into(),
            timestamp: Utc::now(),
        });
        self.touch();
        Ok(())
    }

    /// Move one domain session to `to` and record the change
    pub fn transition_domain(
        &mut self,
        domain: &str,
        to: LifecycleState,
        reason: impl Into<String>,
    ) -> OrchestrationResult<()> {
        let not_active = self.not_active(domain);
        let domain_session = self.domain_sessions.get_mut(domain).ok_or(not_active)?;
        let from = domain_session.state;
        from.validate_transition(to)?;
        domain_session.state = to;
        domain_session.last_activity = Utc::now();
        self.state_history.push(StateChange {
            from,
            to,
            domain: Some(domain.to_string()),
            reason: reason.into(),
            timestamp: Utc::now(),
        });
        self.touch();
        Ok(())
    }

    /// Append a validated fragment for `domain`: to the domain's own text,
    /// to the unified document, and as a new segment. Returns the new version.
    pub(crate) fn append_contribution(
        &mut self,
        domain: &str,
        fragment: &str,
        domain_state: Option<String>,
    ) -> OrchestrationResult<u64> {
        if fragment.is_empty() {
            return Ok(self.version);
        }
        let stage = self
            .execution_plan
            .stage_of(domain)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let not_active = self.not_active(domain);
        let domain_session = self.domain_sessions.get_mut(domain).ok_or(not_active)?;

        append_fragment(&mut domain_session.contributed_dsl, fragment);
        domain_session.domain_state = domain_state;
        domain_session.last_activity = Utc::now();

        let start = if self.unified_dsl.is_empty() {
            0
        } else {
            self.unified_dsl.len() + FRAGMENT_SEPARATOR.len()
        };
        append_fragment(&mut self.unified_dsl, fragment);
        self.version += 1;
        self.segments.push(DocumentSegment {
            domain: domain.to_string(),
            stage,
            start,
            end: self.unified_dsl.len(),
            version: self.version,
        });
        self.touch();
        Ok(self.version)
    }

    /// `(domain, fragment)` pairs in the order they were contributed
    pub fn reconstruct_fragments(&self) -> Vec<(String, String)> {
        self.segments
            .iter()
            .filter_map(|seg| {
                self.unified_dsl
                    .get(seg.start..seg.end)
                    .map(|text| (seg.domain.clone(), text.to_string()))
            })
            .collect()
    }
}

/// Context handed to a fragment generator for `domain`
pub fn build_domain_context(session: &OrchestrationSession, domain: &str) -> HashMap<String, Value> {
    let mut context = session.shared_context.to_map();
    context.insert("domain".to_string(), Value::String(domain.to_string()));
    context.insert(
        "session_id".to_string(),
        Value::String(session.session_id.clone()),
    );
    if let Some(state) = session
        .domain_sessions
        .get(domain)
        .and_then(|ds| ds.domain_state.clone())
    {
        context.insert("domain_state".to_string(), Value::String(state));
    }
    context
}

fn scalar_arg(name: &str, value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .map(|v| format!(" ({} {})", name, quote(v)))
        .unwrap_or_default()
}

fn list_arg(name: &str, values: &[String]) -> String {
    if values.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
    format!(" ({} {})", name, quoted.join(" "))
}

/// Header in the `orchestration` vocabulary describing the run: the
/// request, the analysis, the plan, product requirements and one
/// sub-workflow per domain in plan order. Unset request fields are left
/// out, so validation reports them as missing arguments.
pub fn build_orchestration_header(session: &OrchestrationSession, catalog: &ProductCatalog) -> String {
    let ctx = &session.shared_context;
    let domains = session.active_domains();
    let target = ctx
        .cbu_id
        .as_deref()
        .or(ctx.entity_id.as_deref())
        .unwrap_or(&session.session_id);

    let mut lines = vec![
        format!(
            "(orchestration.initialize{}{}{}{}{}{})",
            scalar_arg("session.id", Some(&session.session_id)),
            scalar_arg("cbu.id", ctx.cbu_id.as_deref()),
            scalar_arg("entity.name", ctx.entity_name.as_deref()),
            scalar_arg("entity.type", ctx.entity_type.as_deref()),
            scalar_arg("jurisdiction", ctx.jurisdiction.as_deref()),
            list_arg("products", &ctx.products),
        ),
        format!(
            "(orchestration.context.analyze{}{}{} (complexity.assessment {}){})",
            scalar_arg("entity.type", ctx.entity_type.as_deref()),
            list_arg("products", &ctx.products),
            scalar_arg("jurisdiction", ctx.jurisdiction.as_deref()),
            quote(Complexity::for_domain_count(domains.len()).as_str()),
            scalar_arg("compliance.tier", ctx.compliance_tier.as_deref()),
        ),
        format!(
            "(orchestration.domains.determine{}{})",
            scalar_arg("primary.domain", Some(&session.primary_domain)),
            list_arg("required.domains", &domains),
        ),
        format!(
            "(orchestration.execution.plan{} (total.stages {}))",
            scalar_arg("session.id", Some(&session.session_id)),
            session.execution_plan.stages.len(),
        ),
    ];

    if let Some(entity_type) = ctx.entity_type.as_deref().filter(|t| !t.is_empty()) {
        for product in &ctx.products {
            match catalog.generate_workflow(target, product, entity_type) {
                Ok(workflow) => lines.push(workflow.generated_dsl),
                Err(e) => debug!(product = %product, "no product workflow in header: {}", e),
            }
        }
    }

    let order = session.execution_plan.domain_order();
    for domain in &order {
        let dependencies = session
            .domain_sessions
            .get(domain)
            .map(|ds| ds.dependencies.as_slice())
            .unwrap_or_default();
        lines.push(format!(
            "(workflow.execute.subdomain{}{}{})",
            scalar_arg("domain", Some(domain)),
            scalar_arg("entity.target", Some(target)),
            list_arg("depends.on", dependencies),
        ));
    }
    if !order.is_empty() {
        lines.push(format!("(workflow.wait.for.completion{})", list_arg("workflows", &order)));
    }
    lines.join("\n")
}

/// Commented, sectioned rendering of the unified document. Read-only.
pub fn render_master_document(session: &OrchestrationSession) -> String {
    let mut out = String::new();
    out.push_str("; Master DSL document\n");
    out.push_str(&format!("; session: {}\n", session.session_id));
    out.push_str(&format!("; primary domain: {}\n", session.primary_domain));
    out.push_str(&format!("; domains: {}\n", session.active_domains().join(", ")));
    out.push_str(&format!("; version: {}\n", session.version));

    if !session.orchestration_dsl.is_empty() {
        out.push_str("\n; === ORCHESTRATION ===\n");
        out.push_str(&session.orchestration_dsl);
        out.push('\n');
    }
    for (domain, fragment) in session.reconstruct_fragments() {
        out.push_str(&format!("\n; === {} ===\n", domain.to_uppercase()));
        out.push_str(&fragment);
        out.push('\n');
    }
    out
}
