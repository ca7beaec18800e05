//! OB-POC DSL - language-as-state engine for onboarding workflows
//!
//! The DSL text of a session *is* its state: fragments are parsed, checked
//! against a domain vocabulary and its state machine, and then appended to
//! an ever-growing document. Several domains can contribute to one unified
//! document through the orchestrator.
//!
//! ## Pipeline
//! DSL text -> Parser -> Grammar / Vocabulary checks -> Session (append) ->
//! Orchestrator (multi-domain composition)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ob_poc_dsl::domains::onboarding;
//! use ob_poc_dsl::session::SessionManager;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let manager = SessionManager::new();
//! let domain = onboarding::domain()?;
//! manager.get_or_create("case-1", "onboarding").await;
//! let submitted = manager
//!     .submit("case-1", r#"(case.create (cbu.id "CBU-1234") (nature-purpose "Fund"))"#, &domain)
//!     .await?;
//! assert_eq!(submitted.state.as_deref(), Some("CREATE"));
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

pub mod config;

// Text processing
pub mod grammar;
pub mod parser;
pub mod placeholder;

// Vocabularies and the domains built from them
pub mod domains;
pub mod vocabulary;

// Stateful layers
pub mod orchestration;
pub mod session;

pub use config::{OrchestratorConfig, SessionConfig};
pub use domains::{standard_registry, Domain, DomainRegistry};
pub use error::{
    DSLError, DSLResult, GrammarError, OrchestrationError, ParseError, PersistenceError,
    PlaceholderError, PlanningError, SessionError, SourceLocation, TransitionError,
    VocabularyError,
};
pub use grammar::GrammarEngine;
pub use orchestration::{
    ExecutionPlan, FragmentGenerator, LifecycleState, OrchestrationRequest, OrchestrationSession,
    Orchestrator, TemplateFragmentGenerator,
};
pub use parser::{extract_attribute_ids, extract_attributes, extract_verbs, parse, SyntaxTree};
pub use placeholder::PlaceholderResolver;
pub use session::{Session, SessionManager};
pub use vocabulary::{DomainStateMachine, DomainVocabulary, VerbDefinition};
