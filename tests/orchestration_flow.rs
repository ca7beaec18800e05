//! Orchestration Flow Tests
//!
//! Multi-domain sessions end to end: creation, validated contributions,
//! planning with custom dependency tables, persistence and composition.
//!
//! Run with: cargo test --test orchestration_flow

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ob_poc_dsl::domains::standard_registry;
use ob_poc_dsl::error::{
    OrchestrationError, PersistenceError, PersistenceResult, PlanningError, TransitionError,
};
use ob_poc_dsl::orchestration::analysis::EntityRule;
use ob_poc_dsl::orchestration::{
    render_master_document, DomainRules, DslStore, InMemoryStore, LifecycleState,
    OrchestrationRequest, OrchestrationSession, OrchestrationStore, Orchestrator,
    TemplateFragmentGenerator,
};
use tokio::sync::Notify;
use ob_poc_dsl::OrchestratorConfig;
use pretty_assertions::assert_eq;

fn request(id: &str, entity_type: &str, jurisdiction: &str) -> OrchestrationRequest {
    OrchestrationRequest {
        session_id: Some(id.to_string()),
        cbu_id: Some("CBU-1234".to_string()),
        entity_name: Some("Jane Doe".to_string()),
        entity_type: Some(entity_type.to_string()),
        jurisdiction: Some(jurisdiction.to_string()),
        products: vec!["CUSTODY".to_string()],
        ..Default::default()
    }
}

fn shared_store_orchestrator(store: &Arc<InMemoryStore>) -> Orchestrator {
    Orchestrator::with_stores(
        standard_registry().unwrap(),
        OrchestratorConfig::default(),
        store.clone(),
        store.clone(),
    )
}

/// Store whose `save` waits to be released and then fails
#[derive(Default)]
struct GatedStore {
    inner: InMemoryStore,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl OrchestrationStore for GatedStore {
    async fn save(&self, _session: &OrchestrationSession) -> PersistenceResult<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Err(PersistenceError::Store {
            message: "disk full".to_string(),
        })
    }

    async fn load(&self, session_id: &str) -> PersistenceResult<OrchestrationSession> {
        self.inner.load(session_id).await
    }

    async fn delete(&self, session_id: &str) -> PersistenceResult<()> {
        self.inner.delete(session_id).await
    }

    async fn list_ids(&self) -> PersistenceResult<Vec<String>> {
        self.inner.list_ids().await
    }
}

/// `CHAIN` entities pull in `b` after `a` and `c` after `b`
fn chain_rules(cyclic: bool) -> DomainRules {
    let mut dependencies = vec![
        ("b".to_string(), "a".to_string()),
        ("c".to_string(), "b".to_string()),
    ];
    if cyclic {
        dependencies.push(("a".to_string(), "c".to_string()));
    }
    let mut rules = DomainRules {
        default_primary: "a".to_string(),
        entity_rules: BTreeMap::new(),
        product_rules: Vec::new(),
        ..DomainRules::default()
    };
    rules.entity_rules.insert(
        "CHAIN".to_string(),
        EntityRule {
            domains: vec!["b".to_string(), "c".to_string()],
            dependencies,
        },
    );
    rules
}

#[tokio::test]
async fn test_onboarding_walk_and_rejection() {
    let orch = Orchestrator::new(standard_registry().unwrap(), OrchestratorConfig::default());
    let session = orch.create_session(request("walk", "PROPER_PERSON", "KY")).await.unwrap();
    assert_eq!(session.current_state, LifecycleState::Created);

    let created = orch
        .contribute(
            "walk",
            "onboarding",
            r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Private client"))"#,
        )
        .await
        .unwrap();
    assert_eq!(created.domain_state.as_deref(), Some("CREATE"));

    let added = orch
        .contribute("walk", "onboarding", r#"(products.add "CUSTODY")"#)
        .await
        .unwrap();
    assert_eq!(added.previous_state.as_deref(), Some("CREATE"));
    assert_eq!(added.domain_state.as_deref(), Some("PRODUCTS_ADDED"));
    assert_eq!(added.version, 2);

    let err = orch
        .contribute("walk", "onboarding", r#"(case.create (cbu.id "CBU-9") (nature-purpose "again"))"#)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Transition(TransitionError::VerbNotAllowed { .. })
    ));

    let session = orch.get_session("walk").await.unwrap();
    assert_eq!(session.version, 2);
    assert_eq!(
        session.domain_sessions["onboarding"].domain_state.as_deref(),
        Some("PRODUCTS_ADDED")
    );
    assert_eq!(
        session.unified_dsl,
        "(case.create (cbu.id \"CBU-1234\") (nature-purpose \"Private client\"))\n\n(products.add \"CUSTODY\")"
    );

    let status = orch.session_status("walk").await.unwrap();
    assert_eq!(status.current_state, LifecycleState::Active);
}

#[test]
fn test_chain_plans_in_three_stages() {
    let orch = Orchestrator::new(standard_registry().unwrap(), OrchestratorConfig::default())
        .with_rules(chain_rules(false));
    let analysis = orch.analyze(&OrchestrationRequest {
        entity_type: Some("CHAIN".to_string()),
        ..Default::default()
    });
    assert_eq!(analysis.required_domains, vec!["a", "b", "c"]);

    let plan = orch.plan(&analysis).unwrap();
    assert_eq!(plan.domain_order(), vec!["a", "b", "c"]);
    assert_eq!(plan.stages.len(), 3);
    assert_eq!(plan.stages[2].prerequisites, vec!["stage_2"]);
    assert!(plan.parallel_groups.is_empty());
    assert_eq!(plan.estimated_duration, Duration::from_secs(90));
}

#[test]
fn test_cyclic_dependencies_are_rejected() {
    let orch = Orchestrator::new(standard_registry().unwrap(), OrchestratorConfig::default())
        .with_rules(chain_rules(true));
    let analysis = orch.analyze(&OrchestrationRequest {
        entity_type: Some("CHAIN".to_string()),
        ..Default::default()
    });

    match orch.plan(&analysis) {
        Err(PlanningError::CircularDependency { remaining }) => {
            assert_eq!(remaining, vec!["a", "b", "c"]);
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}

#[tokio::test]
async fn test_first_save_failure_aborts_creation() {
    let store = Arc::new(InMemoryStore::new());
    let orch = shared_store_orchestrator(&store);

    store.set_fail_writes(true);
    let err = orch
        .create_session(request("unsaved", "PROPER_PERSON", "KY"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Persistence(PersistenceError::Store { .. })));
    assert!(orch.list_active_sessions().await.is_empty());
    assert!(orch.get_session("unsaved").await.is_err());
    assert_eq!(orch.metrics().await.total_sessions, 0);
}

#[tokio::test]
async fn test_session_invisible_while_first_save_pending() {
    let store = Arc::new(GatedStore::default());
    let orch = Arc::new(Orchestrator::with_stores(
        standard_registry().unwrap(),
        OrchestratorConfig::default(),
        store.clone(),
        Arc::new(InMemoryStore::new()),
    ));

    let creating = tokio::spawn({
        let orch = Arc::clone(&orch);
        async move { orch.create_session(request("pending", "PROPER_PERSON", "KY")).await }
    });
    store.entered.notified().await;

    assert!(orch.get_session("pending").await.is_err());
    assert!(orch.session_status("pending").await.is_err());
    assert!(orch
        .contribute(
            "pending",
            "onboarding",
            r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Private client"))"#,
        )
        .await
        .is_err());

    store.release.notify_one();
    let err = creating.await.unwrap().unwrap_err();
    assert!(matches!(err, OrchestrationError::Persistence(PersistenceError::Store { .. })));
    assert!(orch.list_active_sessions().await.is_empty());
}

#[tokio::test]
async fn test_failed_recreate_keeps_cached_session() {
    let store = Arc::new(InMemoryStore::new());
    let orch = shared_store_orchestrator(&store);
    orch.create_session(request("dup", "PROPER_PERSON", "KY")).await.unwrap();
    orch.contribute(
        "dup",
        "onboarding",
        r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Private client"))"#,
    )
    .await
    .unwrap();

    store.set_fail_writes(true);
    assert!(orch
        .create_session(request("dup", "PROPER_PERSON", "KY"))
        .await
        .is_err());

    let session = orch.get_session("dup").await.unwrap();
    assert_eq!(session.version, 1);
    assert_eq!(orch.metrics().await.total_sessions, 1);
}

#[tokio::test]
async fn test_later_save_failures_do_not_block_contributions() {
    let store = Arc::new(InMemoryStore::new());
    let orch = shared_store_orchestrator(&store);
    orch.create_session(request("flaky", "PROPER_PERSON", "KY")).await.unwrap();

    store.set_fail_writes(true);
    let result = orch
        .contribute(
            "flaky",
            "onboarding",
            r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Private client"))"#,
        )
        .await
        .unwrap();
    assert_eq!(result.version, 1);
    assert_eq!(orch.get_session("flaky").await.unwrap().version, 1);

    // The store still holds the creation snapshot
    assert_eq!(store.load("flaky").await.unwrap().version, 0);
    assert!(store.get_latest("flaky").await.is_err());
}

#[tokio::test]
async fn test_sessions_restore_from_shared_store() {
    let store = Arc::new(InMemoryStore::new());
    let first = shared_store_orchestrator(&store);
    first.create_session(request("shared", "PROPER_PERSON", "KY")).await.unwrap();
    first
        .contribute(
            "shared",
            "onboarding",
            r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Private client"))"#,
        )
        .await
        .unwrap();

    let second = shared_store_orchestrator(&store);
    assert_eq!(second.list_active_sessions().await, vec!["shared"]);
    let added = second
        .contribute("shared", "onboarding", r#"(products.add "CUSTODY")"#)
        .await
        .unwrap();
    assert_eq!(added.version, 2);
    assert_eq!(added.previous_state.as_deref(), Some("CREATE"));
}

#[tokio::test]
async fn test_compose_and_render_master_document() {
    let orch = Orchestrator::new(standard_registry().unwrap(), OrchestratorConfig::default());
    orch.create_session(request("compose", "PROPER_PERSON", "KY")).await.unwrap();
    let generator = TemplateFragmentGenerator::new(standard_registry().unwrap());

    let result = orch.compose("compose", &generator).await.unwrap();
    assert_eq!(result.final_state, LifecycleState::Completed);
    assert_eq!(result.version, 3);

    let session = orch.get_session("compose").await.unwrap();
    assert_eq!(result.unified_dsl, session.unified_dsl);
    assert!(session
        .state_history
        .iter()
        .any(|c| c.domain.is_none() && c.to == LifecycleState::Completed));

    let document = render_master_document(&session);
    assert!(document.starts_with("; Master DSL document\n; session: compose\n"));
    let header = document.find("; === ORCHESTRATION ===").unwrap();
    let custody = document.find("; === CUSTODY ===").unwrap();
    let kyc = document.find("; === KYC ===").unwrap();
    let onboarding = document.find("; === ONBOARDING ===").unwrap();
    assert!(header < custody && custody < kyc && kyc < onboarding);
    assert!(document.contains("(orchestration.initialize (session.id \"compose\")"));
    assert!(document.contains("(workflow.execute.subdomain (domain \"kyc\")"));
    assert!(document.contains("(kyc.begin"));

    let metrics = orch.metrics().await;
    assert_eq!(metrics.completed_workflows, 1);
    assert_eq!(metrics.domains_coordinated.len(), 3);
}
