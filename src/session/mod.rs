//! Language-as-state sessions
//!
//! A session's DSL text is its durable state. Text is only ever appended,
//! one fragment at a time, and every non-empty append bumps the version.
//! Version N is always version N-1 plus [`FRAGMENT_SEPARATOR`] plus the
//! fragment (no separator when N-1 was empty).

pub mod manager;

pub use manager::{SessionManager, Submission};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Separator placed between accumulated fragments
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Append `fragment` to `text`. Returns false for an empty fragment, which
/// leaves `text` as it was.
pub fn append_fragment(text: &mut String, fragment: &str) -> bool {
    if fragment.is_empty() {
        return false;
    }
    if !text.is_empty() {
        text.push_str(FRAGMENT_SEPARATOR);
    }
    text.push_str(fragment);
    true
}

/// Entity ids and workflow data gathered while a session runs.
///
/// Well-known keys land in typed fields; anything else is kept in `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub investor_id: Option<String>,
    pub fund_id: Option<String>,
    pub class_id: Option<String>,
    pub cbu_id: Option<String>,
    pub entity_id: Option<String>,
    pub investor_name: Option<String>,
    pub investor_type: Option<String>,
    pub domicile: Option<String>,
    /// Business state in the session domain's state machine
    pub current_state: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

impl SessionContext {
    fn field_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "investor_id" => Some(&mut self.investor_id),
            "fund_id" => Some(&mut self.fund_id),
            "class_id" => Some(&mut self.class_id),
            "cbu_id" => Some(&mut self.cbu_id),
            "entity_id" => Some(&mut self.entity_id),
            "investor_name" => Some(&mut self.investor_name),
            "investor_type" => Some(&mut self.investor_type),
            "domicile" => Some(&mut self.domicile),
            "current_state" => Some(&mut self.current_state),
            _ => None,
        }
    }

    fn field(&self, key: &str) -> Option<&Option<String>> {
        match key {
            "investor_id" => Some(&self.investor_id),
            "fund_id" => Some(&self.fund_id),
            "class_id" => Some(&self.class_id),
            "cbu_id" => Some(&self.cbu_id),
            "entity_id" => Some(&self.entity_id),
            "investor_name" => Some(&self.investor_name),
            "investor_type" => Some(&self.investor_type),
            "domicile" => Some(&self.domicile),
            "current_state" => Some(&self.current_state),
            _ => None,
        }
    }

    /// Value for `key`, from a typed field or `data`
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.field(key) {
            Some(field) => field.clone().map(Value::String),
            None => self.data.get(key).cloned(),
        }
    }

    /// Set one key. A `null` clears a typed field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.field_mut(&key) {
            Some(field) => {
                *field = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                }
            }
            None => {
                self.data.insert(key, value);
            }
        }
    }

    /// Flatten typed fields and `data` into one map, e.g. for placeholder
    /// resolution.
    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut map = self.data.clone();
        for key in [
            "investor_id",
            "fund_id",
            "class_id",
            "cbu_id",
            "entity_id",
            "investor_name",
            "investor_type",
            "domicile",
            "current_state",
        ] {
            if let Some(value) = self.get(key) {
                map.insert(key.to_string(), value);
            }
        }
        map
    }
}

/// One conversational turn recorded against a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub dsl: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    domain: String,
    text: String,
    version: u64,
    context: SessionContext,
    history: Vec<Message>,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

impl Session {
    /// New empty session; an empty `id` gets a fresh UUID.
    pub fn new(id: impl Into<String>, domain: impl Into<String>) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            id: if id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                id
            },
            domain: domain.into(),
            text: String::new(),
            version: 0,
            context: SessionContext::default(),
            history: Vec::new(),
            created_at: now,
            last_used: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        self.last_used
    }

    /// Time since the session was last used
    pub fn idle_for(&self) -> Duration {
        (Utc::now() - self.last_used).to_std().unwrap_or_default()
    }

    pub fn current_state(&self) -> Option<&str> {
        self.context.current_state.as_deref()
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Utc::now();
    }

    /// Append a fragment. Empty fragments are a no-op and return false.
    pub fn accumulate(&mut self, fragment: &str) -> bool {
        if !append_fragment(&mut self.text, fragment) {
            return false;
        }
        self.version += 1;
        self.touch();
        true
    }

    pub fn update_context(&mut self, updates: HashMap<String, Value>) {
        for (key, value) in updates {
            self.context.set(key, value);
        }
        self.touch();
    }

    /// Change domain. The business state belongs to the old domain's
    /// machine, so it is cleared.
    pub fn switch_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
        self.context.current_state = None;
        self.touch();
    }

    pub(crate) fn set_current_state(&mut self, state: Option<String>) {
        self.context.current_state = state;
    }

    /// Clear text, version, context and history; keep id and domain.
    pub fn reset(&mut self) {
        self.text.clear();
        self.version = 0;
        self.context = SessionContext::default();
        self.history.clear();
        self.touch();
    }

    pub fn add_message(
        &mut self,
        role: impl Into<String>,
        content: impl Into<String>,
        dsl: Option<String>,
        metadata: Option<HashMap<String, Value>>,
    ) {
        self.history.push(Message {
            role: role.into(),
            content: content.into(),
            dsl,
            metadata: metadata.unwrap_or_default(),
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// Copy of the message history
    pub fn history(&self) -> Vec<Message> {
        self.history.clone()
    }

    /// Copy of the context
    pub fn context(&self) -> SessionContext {
        self.context.clone()
    }
}
