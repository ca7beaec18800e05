//! Composition: validated contributions into the unified document, and
//! plan-driven generation across all domains of a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::generator::{FragmentGenerator, GeneratedFragment};
use super::lifecycle::{LifecycleState, LIFECYCLE_DOMAIN};
use super::plan::StageState;
use super::session::{build_domain_context, build_orchestration_header};
use super::{routing, Orchestrator, SessionHandle};
use crate::domains::orchestration::DOMAIN as ORCHESTRATION_DOMAIN;
use crate::error::{
    OrchestrationError, OrchestrationResult, PlaceholderError, TransitionError,
};
use crate::parser::parse;

/// Outcome of one accepted contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionResult {
    pub session_id: String,
    pub domain: String,
    /// Unified document version after the contribution
    pub version: u64,
    pub previous_state: Option<String>,
    pub domain_state: Option<String>,
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionResult {
    pub session_id: String,
    pub contributions: Vec<ContributionResult>,
    /// Domains left alone because an earlier run already covered them
    pub skipped_domains: Vec<String>,
    pub stages_completed: usize,
    pub final_state: LifecycleState,
    pub unified_dsl: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionResult {
    pub session_id: String,
    pub instruction: String,
    pub target_domains: Vec<String>,
    pub contributions: Vec<ContributionResult>,
    /// domain -> error message, for domains that could not contribute
    pub errors: BTreeMap<String, String>,
}

impl InstructionResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Map a generator failure onto the orchestration error taxonomy
fn generation_error(domain: &str, error: anyhow::Error) -> OrchestrationError {
    match error.downcast::<PlaceholderError>() {
        Ok(placeholder) => OrchestrationError::Placeholder(placeholder),
        Err(other) => OrchestrationError::Generation {
            domain: domain.to_string(),
            message: other.to_string(),
        },
    }
}

/// Domain a generated fragment belongs to: the one owning its component,
/// or the one that was asked.
fn target_domain(requested: &str, fragment: &GeneratedFragment) -> String {
    match fragment.component.as_deref() {
        Some(component) => {
            let target = routing::map_component_to_domain(component);
            if target != requested {
                debug!(requested, component, target = %target, "fragment routed by component");
            }
            target
        }
        None => requested.to_string(),
    }
}

fn accepts_contributions(state: LifecycleState) -> bool {
    matches!(state, LifecycleState::Created | LifecycleState::Active)
}

impl Orchestrator {
    /// Validate `fragment` against `domain` and append it to the session.
    ///
    /// Parsing and verb checks run before the session is locked; the
    /// lifecycle check, transition planning, the append and the state
    /// changes then commit together. Only CREATED or ACTIVE orchestrations
    /// and domain sessions take fragments. Persistence afterwards is
    /// best-effort.
    pub async fn contribute(
        &self,
        session_id: &str,
        domain: &str,
        fragment: &str,
    ) -> OrchestrationResult<ContributionResult> {
        let definition = self.registry.get(domain)?;
        let tree = parse(fragment)?;
        let vocabulary = definition.vocabulary();
        vocabulary.validate_verbs(&tree)?;
        if self.config.strict_arguments {
            vocabulary.validate_arguments(&tree)?;
        }

        let handle = self.handle(session_id).await?;
        let (result, snapshot) = {
            let mut session = handle.lock().await;
            if !accepts_contributions(session.current_state) {
                return Err(TransitionError::IllegalTransition {
                    domain: LIFECYCLE_DOMAIN.to_string(),
                    from: session.current_state.to_string(),
                    to: LifecycleState::Active.to_string(),
                }
                .into());
            }
            let current = session.domain_session(domain)?;
            let previous_state = current.domain_state.clone();
            let lifecycle = current.state;
            if !accepts_contributions(lifecycle) {
                return Err(TransitionError::IllegalTransition {
                    domain: domain.to_string(),
                    from: lifecycle.to_string(),
                    to: LifecycleState::Active.to_string(),
                }
                .into());
            }

            let domain_state = vocabulary.plan_transitions(previous_state.as_deref(), &tree)?;
            let version = session.append_contribution(domain, fragment, domain_state.clone())?;
            if lifecycle == LifecycleState::Created {
                session.transition_domain(domain, LifecycleState::Active, "first contribution")?;
            }
            if session.current_state == LifecycleState::Created {
                session.transition(LifecycleState::Active, format!("first contribution from {}", domain))?;
            }
            for (attribute_id, value) in tree.attribute_bindings() {
                session.shared_context.attribute_values.insert(attribute_id, value);
            }

            let result = ContributionResult {
                session_id: session_id.to_string(),
                domain: domain.to_string(),
                version,
                previous_state,
                domain_state,
                verbs: tree.verbs(),
            };
            (result, session.clone())
        };

        debug!(
            session_id,
            domain,
            version = result.version,
            state = result.domain_state.as_deref().unwrap_or("-"),
            "fragment contributed"
        );
        *self
            .metrics
            .lock()
            .await
            .domains_coordinated
            .entry(domain.to_string())
            .or_default() += 1;

        self.persist(&snapshot).await;
        if let Err(e) = self
            .dsl_store
            .insert_with_state(session_id, &snapshot.unified_dsl, snapshot.current_state.as_str())
            .await
        {
            warn!(session_id, "failed to record DSL version: {}", e);
        }
        Ok(result)
    }

    /// Check a header against the `orchestration` vocabulary: known verbs,
    /// required arguments and a legal walk from the start.
    pub fn validate_header(&self, header: &str) -> OrchestrationResult<()> {
        let definition = self.registry.get(ORCHESTRATION_DOMAIN)?;
        let tree = parse(header)?;
        let vocabulary = definition.vocabulary();
        vocabulary.validate_verbs(&tree)?;
        vocabulary.validate_arguments(&tree)?;
        vocabulary.plan_transitions(None, &tree)?;
        Ok(())
    }

    /// Generate and contribute a fragment for every domain, stage by stage.
    ///
    /// The first run records a validated orchestration header; a header
    /// that fails validation aborts before any stage and changes nothing.
    /// On the first generation or contribution failure the domain and the
    /// orchestration go to FAILED and the error is returned; earlier
    /// contributions stay committed. After a restart, completed stages and
    /// domains that already contributed are skipped.
    pub async fn compose(
        &self,
        session_id: &str,
        generator: &dyn FragmentGenerator,
    ) -> OrchestrationResult<CompositionResult> {
        let handle = self.handle(session_id).await?;
        let (stages, header) = {
            let session = handle.lock().await;
            if !accepts_contributions(session.current_state) {
                return Err(TransitionError::IllegalTransition {
                    domain: LIFECYCLE_DOMAIN.to_string(),
                    from: session.current_state.to_string(),
                    to: LifecycleState::Completed.to_string(),
                }
                .into());
            }
            let header = (session.orchestration_dsl.is_empty() && self.registry.contains(ORCHESTRATION_DOMAIN))
                .then(|| build_orchestration_header(&session, &self.products));
            (session.execution_plan.stages.clone(), header)
        };

        if let Some(header) = header {
            if let Err(e) = self.validate_header(&header) {
                warn!(session_id, "orchestration header rejected: {}", e);
                return Err(e);
            }
            let mut session = handle.lock().await;
            session.orchestration_dsl = header;
            session.touch();
        }

        let mut contributions = Vec::new();
        let mut skipped_domains = Vec::new();
        for (index, stage) in stages.iter().enumerate() {
            if stage.state == StageState::Completed {
                debug!(stage = %stage.name, "stage already completed");
                skipped_domains.extend(stage.domains.iter().cloned());
                continue;
            }
            self.set_stage_state(&handle, index, StageState::Running).await;

            for domain in &stage.domains {
                let context = {
                    let session = handle.lock().await;
                    if !session.domain_session(domain)?.contributed_dsl.is_empty() {
                        debug!(domain = %domain, "domain already contributed");
                        skipped_domains.push(domain.clone());
                        continue;
                    }
                    build_domain_context(&session, domain)
                };

                let outcome = match generator.generate(domain, &context).await {
                    Ok(fragment) => {
                        let target = target_domain(domain, &fragment);
                        self.contribute(session_id, &target, &fragment.dsl)
                            .await
                            .map(|result| (fragment, result))
                    }
                    Err(e) => Err(generation_error(domain, e)),
                };

                match outcome {
                    Ok((fragment, result)) => {
                        if fragment.to_state_hint.is_some() && fragment.to_state_hint != result.domain_state {
                            debug!(
                                domain = %domain,
                                hint = ?fragment.to_state_hint,
                                state = ?result.domain_state,
                                "generator state hint differs from verb transitions"
                            );
                        }
                        contributions.push(result);
                    }
                    Err(e) => {
                        warn!(session_id, domain = %domain, stage = %stage.name, "composition failed: {}", e);
                        self.fail_composition(&handle, index, domain, &e.to_string()).await;
                        return Err(e);
                    }
                }
            }

            self.complete_stage(&handle, index, &stage.domains).await?;
        }

        let snapshot = {
            let mut session = handle.lock().await;
            if session.current_state == LifecycleState::Created {
                session.transition(LifecycleState::Active, "composition started")?;
            }
            session.transition(LifecycleState::Completed, "composition finished")?;
            session.clone()
        };
        self.record_lifecycle(LifecycleState::Completed).await;
        self.persist(&snapshot).await;
        info!(
            session_id,
            stages = stages.len(),
            skipped = skipped_domains.len(),
            version = snapshot.version,
            "composition completed"
        );

        Ok(CompositionResult {
            session_id: session_id.to_string(),
            contributions,
            skipped_domains,
            stages_completed: stages.len(),
            final_state: snapshot.current_state,
            unified_dsl: snapshot.unified_dsl,
            version: snapshot.version,
        })
    }

    async fn set_stage_state(&self, handle: &SessionHandle, index: usize, state: StageState) {
        let mut session = handle.lock().await;
        if let Some(stage) = session.execution_plan.stages.get_mut(index) {
            stage.state = state;
        }
    }

    /// Mark the stage COMPLETED and move its domains to COMPLETED
    async fn complete_stage(
        &self,
        handle: &SessionHandle,
        index: usize,
        domains: &[String],
    ) -> OrchestrationResult<()> {
        let snapshot = {
            let mut session = handle.lock().await;
            for domain in domains {
                let state = session.domain_session(domain)?.state;
                if state == LifecycleState::Created {
                    session.transition_domain(domain, LifecycleState::Active, "stage started")?;
                }
                if state != LifecycleState::Completed {
                    session.transition_domain(domain, LifecycleState::Completed, "stage completed")?;
                }
            }
            if let Some(stage) = session.execution_plan.stages.get_mut(index) {
                stage.state = StageState::Completed;
                debug!(stage = %stage.name, "stage completed");
            }
            session.clone()
        };
        self.persist(&snapshot).await;
        Ok(())
    }

    async fn fail_composition(&self, handle: &SessionHandle, index: usize, domain: &str, reason: &str) {
        let snapshot = {
            let mut session = handle.lock().await;
            if let Some(stage) = session.execution_plan.stages.get_mut(index) {
                stage.state = StageState::Failed;
            }
            if let Err(e) = session.transition_domain(domain, LifecycleState::Failed, reason) {
                debug!(domain, "domain session not moved to FAILED: {}", e);
            }
            if let Err(e) = session.transition(LifecycleState::Failed, reason) {
                debug!("orchestration not moved to FAILED: {}", e);
            }
            session.clone()
        };
        self.record_lifecycle(LifecycleState::Failed).await;
        self.persist(&snapshot).await;
    }

    /// Route a free-text instruction and let each target domain contribute.
    /// One domain failing does not stop the others.
    pub async fn execute_instruction(
        &self,
        session_id: &str,
        instruction: &str,
        generator: &dyn FragmentGenerator,
    ) -> OrchestrationResult<InstructionResult> {
        let handle = self.handle(session_id).await?;
        let target_domains = {
            let session = handle.lock().await;
            routing::route(instruction, &session.active_domains(), &session.primary_domain)
        };
        info!(session_id, targets = ?target_domains, "routing instruction");

        let mut contributions = Vec::new();
        let mut errors = BTreeMap::new();
        for domain in &target_domains {
            let mut context = {
                let session = handle.lock().await;
                build_domain_context(&session, domain)
            };
            context.insert("instruction".to_string(), Value::String(instruction.to_string()));

            let outcome = match generator.generate(domain, &context).await {
                Ok(fragment) => {
                    let target = target_domain(domain, &fragment);
                    self.contribute(session_id, &target, &fragment.dsl).await
                }
                Err(e) => Err(generation_error(domain, e)),
            };
            match outcome {
                Ok(result) => contributions.push(result),
                Err(e) => {
                    debug!(session_id, domain = %domain, "instruction failed for domain: {}", e);
                    errors.insert(domain.clone(), e.to_string());
                }
            }
        }

        Ok(InstructionResult {
            session_id: session_id.to_string(),
            instruction: instruction.to_string(),
            target_domains,
            contributions,
            errors,
        })
    }
}
