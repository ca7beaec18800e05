//! Multi-domain orchestration
//!
//! An orchestration session coordinates several domain sessions that all
//! contribute to one unified DSL document. The orchestrator works out which
//! domains a request needs, orders them into stages, and drives fragment
//! generation and contribution through them.
//!
//! ## Locking
//!
//! ```text
//! sessions: RwLock<HashMap<id, Arc<Mutex<OrchestrationSession>>>>
//! ```
//!
//! Store and generator calls never run while either lock is held: callers
//! copy what they need, release, do the slow work, then re-lock to commit.

pub mod analysis;
pub mod compose;
pub mod generator;
pub mod lifecycle;
pub mod plan;
pub mod products;
pub mod routing;
pub mod session;
pub mod store;

pub use analysis::{Complexity, ContextAnalysis, DomainRules, OrchestrationRequest};
pub use compose::{CompositionResult, ContributionResult, InstructionResult};
pub use generator::{FragmentGenerator, GeneratedFragment, TemplateFragmentGenerator};
pub use lifecycle::{lifecycle_state_machine, LifecycleState};
pub use plan::{ExecutionPlan, ExecutionStage, StageState};
pub use products::{
    ProductCatalog, ProductRequirements, ProductValidation, ProductWorkflow, WorkflowStatus,
};
pub use routing::{map_component_to_domain, ROUTING_TABLE};
pub use session::{
    build_domain_context, render_master_document, DocumentSegment, DomainSession,
    OrchestrationSession, SharedContext, StateChange,
};
pub use store::{DslStore, DslVersion, InMemoryStore, OrchestrationStore};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domains::DomainRegistry;
use crate::error::{OrchestrationResult, PersistenceError, PlanningResult, SessionError};

type SessionHandle = Arc<Mutex<OrchestrationSession>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub total_sessions: u64,
    pub active_sessions: usize,
    pub completed_workflows: u64,
    pub failed_workflows: u64,
    /// Contributions accepted per domain
    pub domains_coordinated: BTreeMap<String, u64>,
    pub uptime: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStatus {
    pub domain: String,
    pub state: LifecycleState,
    pub domain_state: Option<String>,
    pub has_dsl: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub primary_domain: String,
    pub current_state: LifecycleState,
    pub version: u64,
    pub domains: Vec<DomainStatus>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

pub struct Orchestrator {
    registry: DomainRegistry,
    rules: DomainRules,
    products: ProductCatalog,
    config: OrchestratorConfig,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    store: Arc<dyn OrchestrationStore>,
    dsl_store: Arc<dyn DslStore>,
    metrics: Mutex<OrchestratorMetrics>,
    started_at: Instant,
}

impl Orchestrator {
    /// Orchestrator backed by one shared `InMemoryStore`
    pub fn new(registry: DomainRegistry, config: OrchestratorConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_stores(registry, config, store.clone(), store)
    }

    pub fn with_stores(
        registry: DomainRegistry,
        config: OrchestratorConfig,
        store: Arc<dyn OrchestrationStore>,
        dsl_store: Arc<dyn DslStore>,
    ) -> Self {
        Self {
            registry,
            rules: DomainRules::default(),
            products: ProductCatalog::default(),
            config,
            sessions: RwLock::new(HashMap::new()),
            store,
            dsl_store,
            metrics: Mutex::new(OrchestratorMetrics::default()),
            started_at: Instant::now(),
        }
    }

    /// Replace the default dependency table
    pub fn with_rules(mut self, rules: DomainRules) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the standard product catalog
    pub fn with_products(mut self, products: ProductCatalog) -> Self {
        self.products = products;
        self
    }

    pub fn products(&self) -> &ProductCatalog {
        &self.products
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &DomainRules {
        &self.rules
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn analyze(&self, request: &OrchestrationRequest) -> ContextAnalysis {
        self.rules.analyze(request)
    }

    pub fn plan(&self, analysis: &ContextAnalysis) -> PlanningResult<plan::ExecutionPlan> {
        plan::build_plan(analysis, &self.rules, self.config.stage_base_duration)
    }

    /// Analyze, plan and register a new orchestration session.
    ///
    /// Catalog products the entity type cannot take are rejected up front.
    /// The first save is part of creation and happens before the session is
    /// cached: if it fails nothing is registered, and a session already
    /// cached under the same id stays in place.
    pub async fn create_session(
        &self,
        request: OrchestrationRequest,
    ) -> OrchestrationResult<OrchestrationSession> {
        if let Some(entity_type) = request.entity_type.as_deref().filter(|t| !t.is_empty()) {
            self.products.check_request(entity_type, &request.products)?;
        }
        let analysis = self.analyze(&request);
        for domain in &analysis.required_domains {
            self.registry.get(domain)?;
        }
        let plan = self.plan(&analysis)?;

        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = OrchestrationSession::new(session_id.clone(), &request, &analysis, plan);

        // Capacity is checked before the save so a full orchestrator never
        // writes, and again on insert since the table may have filled meanwhile.
        {
            let sessions = self.sessions.read().await;
            if !sessions.contains_key(&session_id) {
                self.check_capacity(sessions.len())?;
            }
        }

        // The cache only ever references sessions whose creation is durable
        if self.config.persist_sessions {
            if let Err(e) = self.store.save(&session).await {
                error!(session_id = %session_id, "failed to persist new orchestration session: {}", e);
                return Err(e.into());
            }
        }

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&session_id) {
                warn!(session_id = %session_id, "replacing existing orchestration session");
            } else if let Err(e) = self.check_capacity(sessions.len()) {
                drop(sessions);
                if self.config.persist_sessions {
                    if let Err(delete_err) = self.store.delete(&session_id).await {
                        warn!(session_id = %session_id, "failed to drop rejected session from store: {}", delete_err);
                    }
                }
                return Err(e);
            }
            sessions.insert(session_id.clone(), Arc::new(Mutex::new(session.clone())));
        }

        self.metrics.lock().await.total_sessions += 1;
        info!(
            session_id = %session_id,
            primary_domain = %session.primary_domain,
            domains = ?analysis.required_domains,
            stages = session.execution_plan.stages.len(),
            "orchestration session created"
        );
        Ok(session)
    }

    fn check_capacity(&self, cached: usize) -> OrchestrationResult<()> {
        if cached >= self.config.max_concurrent_sessions {
            warn!(limit = self.config.max_concurrent_sessions, "orchestration session limit reached");
            return Err(SessionError::CapacityExceeded {
                limit: self.config.max_concurrent_sessions,
            }
            .into());
        }
        Ok(())
    }

    /// Cached handle, or one loaded from the store on a miss
    async fn handle(&self, session_id: &str) -> OrchestrationResult<SessionHandle> {
        let cached = self.sessions.read().await.get(session_id).cloned();
        if let Some(handle) = cached {
            return Ok(handle);
        }

        let loaded = match self.store.load(session_id).await {
            Ok(session) => session,
            Err(PersistenceError::NotFound { .. }) => {
                return Err(SessionError::NotFound {
                    session_id: session_id.to_string(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        info!(session_id, "orchestration session restored from store");

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)));
        Ok(Arc::clone(handle))
    }

    /// Copy of a session
    pub async fn get_session(&self, session_id: &str) -> OrchestrationResult<OrchestrationSession> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Save a snapshot; failures are logged, not returned
    async fn persist(&self, session: &OrchestrationSession) {
        if !self.config.persist_sessions {
            return;
        }
        if let Err(e) = self.store.save(session).await {
            warn!(session_id = %session.session_id, "failed to persist orchestration session: {}", e);
        }
    }

    async fn record_lifecycle(&self, to: LifecycleState) {
        let mut metrics = self.metrics.lock().await;
        match to {
            LifecycleState::Completed => metrics.completed_workflows += 1,
            LifecycleState::Failed => metrics.failed_workflows += 1,
            _ => {}
        }
    }

    /// Move the orchestration to `to`; rejected transitions change nothing.
    pub async fn transition_session(
        &self,
        session_id: &str,
        to: LifecycleState,
        reason: &str,
    ) -> OrchestrationResult<()> {
        let handle = self.handle(session_id).await?;
        let snapshot = {
            let mut session = handle.lock().await;
            session.transition(to, reason)?;
            session.clone()
        };
        info!(session_id, state = %to, reason, "orchestration state changed");
        self.record_lifecycle(to).await;
        self.persist(&snapshot).await;
        Ok(())
    }

    /// Move one domain session to `to`; rejected transitions change nothing.
    pub async fn transition_domain(
        &self,
        session_id: &str,
        domain: &str,
        to: LifecycleState,
        reason: &str,
    ) -> OrchestrationResult<()> {
        let handle = self.handle(session_id).await?;
        let snapshot = {
            let mut session = handle.lock().await;
            session.transition_domain(domain, to, reason)?;
            session.clone()
        };
        self.persist(&snapshot).await;
        Ok(())
    }

    pub async fn session_status(&self, session_id: &str) -> OrchestrationResult<SessionStatus> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(SessionStatus {
            session_id: session.session_id.clone(),
            primary_domain: session.primary_domain.clone(),
            current_state: session.current_state,
            version: session.version,
            domains: session
                .domain_sessions
                .values()
                .map(|ds| DomainStatus {
                    domain: ds.domain.clone(),
                    state: ds.state,
                    domain_state: ds.domain_state.clone(),
                    has_dsl: !ds.contributed_dsl.is_empty(),
                })
                .collect(),
            created_at: session.created_at,
            last_used: session.last_used,
        })
    }

    /// Ids of cached and stored sessions, sorted
    pub async fn list_active_sessions(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self.sessions.read().await.keys().cloned().collect();
        match self.store.list_ids().await {
            Ok(stored) => ids.extend(stored),
            Err(e) => warn!("failed to list stored orchestration sessions: {}", e),
        }
        ids.into_iter().collect()
    }

    /// Drop sessions idle longer than `session_timeout`. Returns how many went.
    ///
    /// Sessions locked by a caller are busy, not idle, and are skipped.
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let timeout = self.config.session_timeout;
        let handles: Vec<(String, SessionHandle)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();

        let idle: Vec<(String, SessionHandle)> = handles
            .into_iter()
            .filter(|(_, handle)| match handle.try_lock() {
                Ok(session) => session.idle_for() > timeout,
                Err(_) => false,
            })
            .collect();
        if idle.is_empty() {
            return 0;
        }

        let expired = {
            let mut sessions = self.sessions.write().await;
            let mut expired = Vec::new();
            for (id, handle) in idle {
                // Replaced since the scan
                if !sessions.get(&id).is_some_and(|current| Arc::ptr_eq(current, &handle)) {
                    continue;
                }
                sessions.remove(&id);
                info!(session_id = %id, "orchestration session expired");
                expired.push(id);
            }
            expired
        };

        for id in &expired {
            if let Err(e) = self.store.delete(id).await {
                warn!(session_id = %id, "failed to delete expired session from store: {}", e);
            }
        }
        expired.len()
    }

    pub async fn metrics(&self) -> OrchestratorMetrics {
        let active_sessions = self.sessions.read().await.len();
        let mut metrics = self.metrics.lock().await.clone();
        metrics.active_sessions = active_sessions;
        metrics.uptime = self.started_at.elapsed();
        metrics
    }

    /// Active domains the instruction is meant for
    pub async fn route_instruction(
        &self,
        session_id: &str,
        instruction: &str,
    ) -> OrchestrationResult<Vec<String>> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(routing::route(
            instruction,
            &session.active_domains(),
            &session.primary_domain,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::standard_registry;
    use crate::error::{OrchestrationError, TransitionError, VocabularyError};
    use pretty_assertions::assert_eq;

    fn orchestrator(config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(standard_registry().unwrap(), config)
    }

    fn corporate(id: &str) -> OrchestrationRequest {
        OrchestrationRequest {
            session_id: Some(id.to_string()),
            cbu_id: Some("CBU-1234".to_string()),
            entity_type: Some("CORPORATE".to_string()),
            jurisdiction: Some("LU".to_string()),
            products: vec!["CUSTODY".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_status() {
        let orch = orchestrator(OrchestratorConfig::default());
        let session = orch.create_session(corporate("o-1")).await.unwrap();
        assert_eq!(session.primary_domain, "onboarding");
        assert_eq!(session.shared_context.compliance_tier.as_deref(), Some("ENHANCED"));

        let status = orch.session_status("o-1").await.unwrap();
        assert_eq!(status.current_state, LifecycleState::Created);
        assert_eq!(
            status.domains.iter().map(|d| d.domain.as_str()).collect::<Vec<_>>(),
            vec!["custody", "eu-compliance", "kyc", "onboarding", "ubo"]
        );
        assert!(status.domains.iter().all(|d| !d.has_dsl));

        let metrics = orch.metrics().await;
        assert_eq!(metrics.total_sessions, 1);
        assert_eq!(metrics.active_sessions, 1);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let orch = orchestrator(OrchestratorConfig {
            max_concurrent_sessions: 1,
            ..Default::default()
        });
        orch.create_session(corporate("a")).await.unwrap();
        let err = orch.create_session(corporate("b")).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Session(SessionError::CapacityExceeded { limit: 1 })
        ));
    }

    #[tokio::test]
    async fn test_unregistered_domain_is_rejected() {
        let orch = Orchestrator::new(DomainRegistry::new(), OrchestratorConfig::default());
        let err = orch.create_session(corporate("x")).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Vocabulary(VocabularyError::DomainNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_incompatible_product_is_rejected_before_caching() {
        let orch = orchestrator(OrchestratorConfig::default());
        let request = OrchestrationRequest {
            entity_type: Some("PROPER_PERSON".to_string()),
            products: vec!["CUSTODY".to_string(), "PRIME_BROKERAGE".to_string()],
            ..corporate("pb")
        };
        let err = orch.create_session(request).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::IncompatibleProduct { ref product, .. } if product == "PRIME_BROKERAGE"
        ));
        assert!(orch.list_active_sessions().await.is_empty());
        assert_eq!(orch.metrics().await.total_sessions, 0);

        // Products outside the catalog are routed by keyword, not rejected
        let bespoke = OrchestrationRequest {
            products: vec!["BESPOKE_REPORTING".to_string()],
            ..corporate("bespoke")
        };
        orch.create_session(bespoke).await.unwrap();

        let permissive = orchestrator(OrchestratorConfig::default()).with_products(ProductCatalog::empty());
        let request = OrchestrationRequest {
            entity_type: Some("PROPER_PERSON".to_string()),
            products: vec!["PRIME_BROKERAGE".to_string()],
            ..corporate("pb")
        };
        assert!(permissive.create_session(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let orch = orchestrator(OrchestratorConfig::default());
        orch.create_session(corporate("t")).await.unwrap();

        let err = orch
            .transition_session("t", LifecycleState::Completed, "too early")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Transition(TransitionError::IllegalTransition { .. })
        ));

        orch.transition_session("t", LifecycleState::Active, "start").await.unwrap();
        orch.transition_session("t", LifecycleState::Suspended, "paused").await.unwrap();
        orch.transition_domain("t", "kyc", LifecycleState::Suspended, "paused").await.unwrap();
        assert!(orch
            .transition_domain("t", "trading", LifecycleState::Active, "x")
            .await
            .is_err());

        let session = orch.get_session("t").await.unwrap();
        assert_eq!(session.current_state, LifecycleState::Suspended);
        assert_eq!(session.state_history.len(), 3);
        assert_eq!(session.domain_sessions["kyc"].state, LifecycleState::Suspended);
    }

    #[tokio::test]
    async fn test_store_fallback_and_listing() {
        let store = Arc::new(InMemoryStore::new());
        let first = Orchestrator::with_stores(
            standard_registry().unwrap(),
            OrchestratorConfig::default(),
            store.clone(),
            store.clone(),
        );
        first.create_session(corporate("shared")).await.unwrap();

        let second = Orchestrator::with_stores(
            standard_registry().unwrap(),
            OrchestratorConfig::default(),
            store.clone(),
            store,
        );
        assert_eq!(second.list_active_sessions().await, vec!["shared".to_string()]);
        let restored = second.get_session("shared").await.unwrap();
        assert_eq!(restored.primary_domain, "onboarding");
        assert_eq!(second.metrics().await.active_sessions, 1);

        assert!(matches!(
            second.get_session("missing").await,
            Err(OrchestrationError::Session(SessionError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let orch = orchestrator(OrchestratorConfig {
            session_timeout: Duration::from_millis(20),
            ..Default::default()
        });
        orch.create_session(corporate("old")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        orch.create_session(corporate("new")).await.unwrap();

        assert_eq!(orch.cleanup_expired_sessions().await, 1);
        assert_eq!(orch.list_active_sessions().await, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_cleanup_skips_locked_sessions() {
        let orch = orchestrator(OrchestratorConfig {
            session_timeout: Duration::from_millis(20),
            ..Default::default()
        });
        orch.create_session(corporate("held")).await.unwrap();
        orch.create_session(corporate("idle")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let handle = orch.handle("held").await.unwrap();
        let guard = handle.lock().await;
        let removed = tokio::time::timeout(Duration::from_secs(1), orch.cleanup_expired_sessions())
            .await
            .expect("sweep must not wait on a locked session");
        assert_eq!(removed, 1);
        drop(guard);

        assert!(orch.get_session("held").await.is_ok());
        assert!(orch.get_session("idle").await.is_err());
    }

    #[tokio::test]
    async fn test_route_instruction() {
        let orch = orchestrator(OrchestratorConfig::default());
        orch.create_session(corporate("r")).await.unwrap();
        assert_eq!(
            orch.route_instruction("r", "Open a safekeeping account").await.unwrap(),
            vec!["custody"]
        );
        assert_eq!(
            orch.route_instruction("r", "hello").await.unwrap(),
            vec!["onboarding"]
        );
    }
}
