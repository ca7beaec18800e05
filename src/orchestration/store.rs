//! Persistence boundary for orchestration
//!
//! Two traits: `DslStore` keeps the versioned DSL history per entity,
//! `OrchestrationStore` keeps orchestration session snapshots. The engine only
//! talks to these traits, so a database backend can replace `InMemoryStore`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::session::OrchestrationSession;
use crate::error::{PersistenceError, PersistenceResult};

/// One stored version of an entity's DSL document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DslVersion {
    pub version_id: Uuid,
    pub entity_id: String,
    /// 1-based, per entity
    pub version: u64,
    pub text: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DslStore: Send + Sync {
    /// Record a new version. Returns its id.
    async fn insert_with_state(
        &self,
        entity_id: &str,
        text: &str,
        state: &str,
    ) -> PersistenceResult<Uuid>;

    async fn get_latest(&self, entity_id: &str) -> PersistenceResult<String>;

    /// Latest `(text, state, version)`
    async fn get_latest_with_state(&self, entity_id: &str)
        -> PersistenceResult<(String, String, u64)>;

    /// All versions, oldest first
    async fn get_history(&self, entity_id: &str) -> PersistenceResult<Vec<DslVersion>>;
}

#[async_trait]
pub trait OrchestrationStore: Send + Sync {
    async fn save(&self, session: &OrchestrationSession) -> PersistenceResult<()>;
    async fn load(&self, session_id: &str) -> PersistenceResult<OrchestrationSession>;
    async fn delete(&self, session_id: &str) -> PersistenceResult<()>;
    /// Stored session ids, sorted
    async fn list_ids(&self) -> PersistenceResult<Vec<String>>;
}

/// In-process store for both traits. Sessions are kept as JSON snapshots,
/// so a load never aliases live state.
#[derive(Default)]
pub struct InMemoryStore {
    versions: RwLock<HashMap<String, Vec<DslVersion>>>,
    sessions: RwLock<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with `PersistenceError::Store`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> PersistenceResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Store {
                message: "store is rejecting writes".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DslStore for InMemoryStore {
    async fn insert_with_state(
        &self,
        entity_id: &str,
        text: &str,
        state: &str,
    ) -> PersistenceResult<Uuid> {
        self.check_writable()?;
        let mut versions = self.versions.write().await;
        let history = versions.entry(entity_id.to_string()).or_default();
        let record = DslVersion {
            version_id: Uuid::new_v4(),
            entity_id: entity_id.to_string(),
            version: history.len() as u64 + 1,
            text: text.to_string(),
            state: state.to_string(),
            created_at: Utc::now(),
        };
        let id = record.version_id;
        history.push(record);
        Ok(id)
    }

    async fn get_latest(&self, entity_id: &str) -> PersistenceResult<String> {
        self.get_latest_with_state(entity_id)
            .await
            .map(|(text, _, _)| text)
    }

    async fn get_latest_with_state(
        &self,
        entity_id: &str,
    ) -> PersistenceResult<(String, String, u64)> {
        self.versions
            .read()
            .await
            .get(entity_id)
            .and_then(|history| history.last())
            .map(|v| (v.text.clone(), v.state.clone(), v.version))
            .ok_or_else(|| PersistenceError::NotFound {
                entity_id: entity_id.to_string(),
            })
    }

    async fn get_history(&self, entity_id: &str) -> PersistenceResult<Vec<DslVersion>> {
        Ok(self
            .versions
            .read()
            .await
            .get(entity_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrchestrationStore for InMemoryStore {
    async fn save(&self, session: &OrchestrationSession) -> PersistenceResult<()> {
        self.check_writable()?;
        let snapshot = serde_json::to_value(session).map_err(|e| PersistenceError::Encoding {
            message: e.to_string(),
        })?;
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), snapshot);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> PersistenceResult<OrchestrationSession> {
        let snapshot = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound {
                entity_id: session_id.to_string(),
            })?;
        serde_json::from_value(snapshot).map_err(|e| PersistenceError::Encoding {
            message: e.to_string(),
        })
    }

    async fn delete(&self, session_id: &str) -> PersistenceResult<()> {
        self.check_writable()?;
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn list_ids(&self) -> PersistenceResult<Vec<String>> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
