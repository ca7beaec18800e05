//! SessionManager - concurrent table of language-as-state sessions.
//!
//! ## Locking
//!
//! ```text
//! sessions: RwLock<HashMap<id, Arc<Mutex<Session>>>>
//!   read  : get, list, count, accumulate, submit (lookup only)
//!   write : get_or_create, delete, cleanup_expired (removal only)
//! ```
//!
//! The table lock is released before a session's own `Mutex` is awaited, so
//! work on one session never blocks another. Expiry only `try_lock`s
//! sessions and skips the busy ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::Session;
use crate::config::SessionConfig;
use crate::domains::Domain;
use crate::error::{SessionError, SessionResult};
use crate::parser::parse;

type SessionHandle = Arc<Mutex<Session>>;

/// Outcome of a validated submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub version: u64,
    pub previous_state: Option<String>,
    pub state: Option<String>,
    pub verbs: Vec<String>,
}

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Existing session for `id`, switched to `domain` if needed, or a new
    /// one. An empty `id` always creates a session with a generated id.
    pub async fn get_or_create(&self, id: &str, domain: &str) -> SessionHandle {
        let mut sessions = self.sessions.write().await;

        if let Some(handle) = sessions.get(id) {
            let handle = Arc::clone(handle);
            drop(sessions);
            let mut session = handle.lock().await;
            if session.domain() != domain {
                debug!(session_id = id, from = session.domain(), to = domain, "switching session domain");
                session.switch_domain(domain);
            } else {
                session.touch();
            }
            drop(session);
            return handle;
        }

        let session = Session::new(id, domain);
        let session_id = session.id().to_string();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(session_id.clone(), Arc::clone(&handle));
        info!(session_id = %session_id, domain, "session created");
        handle
    }

    pub async fn get(&self, id: &str) -> SessionResult<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound {
                session_id: id.to_string(),
            })
    }

    /// Point-in-time copy of a session
    pub async fn snapshot(&self, id: &str) -> SessionResult<Session> {
        let handle = self.get(id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    pub async fn delete(&self, id: &str) -> SessionResult<()> {
        match self.sessions.write().await.remove(id) {
            Some(_) => {
                info!(session_id = id, "session deleted");
                Ok(())
            }
            None => Err(SessionError::NotFound {
                session_id: id.to_string(),
            }),
        }
    }

    /// Session ids, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Append a fragment without validation. Returns the resulting version.
    pub async fn accumulate(&self, id: &str, fragment: &str) -> SessionResult<u64> {
        let handle = self.get(id).await?;
        let mut session = handle.lock().await;
        if session.accumulate(fragment) {
            debug!(session_id = id, version = session.version(), "fragment accumulated");
        }
        Ok(session.version())
    }

    pub async fn update_context(&self, id: &str, updates: HashMap<String, Value>) -> SessionResult<()> {
        let handle = self.get(id).await?;
        handle.lock().await.update_context(updates);
        Ok(())
    }

    pub async fn switch_domain(&self, id: &str, domain: &str) -> SessionResult<()> {
        let handle = self.get(id).await?;
        handle.lock().await.switch_domain(domain);
        Ok(())
    }

    /// Validate a fragment against `domain` and append it.
    ///
    /// Parsing and verb checks run before the session is locked. Transition
    /// planning, the append and the state update then happen under the
    /// session lock as one step; any error leaves text, version and state
    /// as they were.
    pub async fn submit(&self, id: &str, fragment: &str, domain: &Domain) -> SessionResult<Submission> {
        let tree = parse(fragment)?;
        let vocabulary = domain.vocabulary();
        vocabulary.validate_verbs(&tree)?;
        if self.config.strict_arguments {
            vocabulary.validate_arguments(&tree)?;
        }

        let handle = self.get(id).await?;
        let mut session = handle.lock().await;
        if session.domain() != domain.name() {
            return Err(SessionError::DomainNotActive {
                session_id: id.to_string(),
                domain: domain.name().to_string(),
            });
        }

        let previous_state = session.current_state().map(str::to_string);
        let state = vocabulary.plan_transitions(previous_state.as_deref(), &tree)?;

        session.accumulate(fragment);
        session.set_current_state(state.clone());
        debug!(
            session_id = id,
            version = session.version(),
            state = state.as_deref().unwrap_or("-"),
            "fragment submitted"
        );

        Ok(Submission {
            version: session.version(),
            previous_state,
            state,
            verbs: tree.verbs(),
        })
    }

    /// Remove sessions idle for longer than `timeout`. Returns how many went.
    /// A session someone holds locked is in use and is kept.
    pub async fn cleanup_expired(&self, timeout: Duration) -> usize {
        let handles: Vec<(String, SessionHandle)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();

        let idle: Vec<(String, SessionHandle)> = handles
            .into_iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .map(|session| session.idle_for() > timeout)
                    .unwrap_or(false)
            })
            .collect();
        if idle.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for (id, handle) in idle {
            if sessions.get(&id).is_some_and(|current| Arc::ptr_eq(current, &handle)) {
                sessions.remove(&id);
                info!(session_id = %id, "session expired");
                removed += 1;
            }
        }
        removed
    }

    /// `cleanup_expired` with the configured idle timeout
    pub async fn cleanup_idle(&self) -> usize {
        self.cleanup_expired(self.config.idle_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::onboarding;
    use crate::error::{TransitionError, VocabularyError};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_or_create_reuses_and_switches() {
        let mgr = SessionManager::new();
        let first = mgr.get_or_create("test", "onboarding").await;
        first.lock().await.accumulate("(case.create)");

        let again = mgr.get_or_create("test", "hedge-fund-investor").await;
        assert!(Arc::ptr_eq(&first, &again));
        let session = again.lock().await;
        assert_eq!(session.domain(), "hedge-fund-investor");
        assert_eq!(session.text(), "(case.create)");
        drop(session);
        assert_eq!(mgr.count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_id_generates_session() {
        let mgr = SessionManager::new();
        let handle = mgr.get_or_create("", "onboarding").await;
        let id = handle.lock().await.id().to_string();
        assert!(!id.is_empty());
        assert_eq!(mgr.list().await, vec![id]);
    }

    #[tokio::test]
    async fn test_missing_sessions() {
        let mgr = SessionManager::new();
        assert!(matches!(mgr.get("nope").await, Err(SessionError::NotFound { .. })));
        assert!(mgr.delete("nope").await.is_err());
        assert!(mgr.accumulate("nope", "(x.y)").await.is_err());
        assert!(mgr.update_context("nope", HashMap::new()).await.is_err());
        assert!(mgr.switch_domain("nope", "kyc").await.is_err());
    }

    #[tokio::test]
    async fn test_update_context_via_manager() {
        let mgr = SessionManager::new();
        mgr.get_or_create("test", "onboarding").await;
        mgr.update_context(
            "test",
            [
                ("cbu_id".to_string(), json!("CBU-1234")),
                ("current_state".to_string(), json!("CREATE")),
            ]
            .into_iter()
            .collect(),
        )
        .await
        .unwrap();

        let snapshot = mgr.snapshot("test").await.unwrap();
        assert_eq!(snapshot.context().cbu_id.as_deref(), Some("CBU-1234"));
        assert_eq!(snapshot.current_state(), Some("CREATE"));
    }

    #[tokio::test]
    async fn test_submit_commits_text_and_state_together() {
        let mgr = SessionManager::new();
        let domain = onboarding::domain().unwrap();
        mgr.get_or_create("s", "onboarding").await;

        let created = mgr
            .submit("s", r#"(case.create (cbu.id "CBU-1") (nature-purpose "x"))"#, &domain)
            .await
            .unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.previous_state, None);
        assert_eq!(created.state.as_deref(), Some("CREATE"));

        let added = mgr.submit("s", r#"(products.add "CUSTODY")"#, &domain).await.unwrap();
        assert_eq!(added.state.as_deref(), Some("PRODUCTS_ADDED"));

        // Skipping ahead is rejected and nothing changes
        let err = mgr
            .submit("s", r#"(workflow.transition (to "WORKFLOW_ACTIVE"))"#, &domain)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Transition(TransitionError::VerbNotAllowed { .. })));

        let err = mgr.submit("s", "(case.explode)", &domain).await.unwrap_err();
        assert!(matches!(err, SessionError::Vocabulary(VocabularyError::UnknownVerb { .. })));

        assert!(matches!(mgr.submit("s", "(case.create", &domain).await, Err(SessionError::Parse(_))));

        let snapshot = mgr.snapshot("s").await.unwrap();
        assert_eq!(snapshot.version(), 2);
        assert_eq!(snapshot.current_state(), Some("PRODUCTS_ADDED"));
        assert!(!snapshot.text().contains("workflow"));
    }

    #[tokio::test]
    async fn test_submit_requires_session_domain() {
        let mgr = SessionManager::new();
        let domain = onboarding::domain().unwrap();
        mgr.get_or_create("s", "kyc").await;
        let err = mgr.submit("s", "(case.update)", &domain).await.unwrap_err();
        assert!(matches!(err, SessionError::DomainNotActive { .. }));
    }

    #[tokio::test]
    async fn test_strict_submit_checks_arguments() {
        let mgr = SessionManager::with_config(SessionConfig {
            strict_arguments: true,
            ..Default::default()
        });
        let domain = onboarding::domain().unwrap();
        mgr.get_or_create("s", "onboarding").await;
        let err = mgr
            .submit("s", r#"(case.create (cbu.id "bad"))"#, &domain)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Vocabulary(_)));
        assert_eq!(mgr.snapshot("s").await.unwrap().version(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let mgr = SessionManager::new();
        mgr.get_or_create("old-1", "onboarding").await;
        mgr.get_or_create("old-2", "onboarding").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        mgr.get_or_create("fresh", "onboarding").await;

        let removed = mgr.cleanup_expired(Duration::from_millis(25)).await;
        assert_eq!(removed, 2);
        assert_eq!(mgr.list().await, vec!["fresh".to_string()]);
        assert_eq!(mgr.cleanup_idle().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_skips_busy_sessions() {
        let mgr = SessionManager::new();
        let busy = mgr.get_or_create("busy", "onboarding").await;
        mgr.get_or_create("idle", "onboarding").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let guard = busy.lock().await;
        let removed = tokio::time::timeout(
            Duration::from_secs(1),
            mgr.cleanup_expired(Duration::from_millis(25)),
        )
        .await
        .expect("sweep must not wait on a locked session");
        assert_eq!(removed, 1);
        // Lookups keep working while the session is held
        assert!(mgr.get("busy").await.is_ok());
        drop(guard);

        assert_eq!(mgr.list().await, vec!["busy".to_string()]);
        assert_eq!(mgr.cleanup_expired(Duration::from_millis(25)).await, 1);
    }
}
