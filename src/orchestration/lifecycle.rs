//! Lifecycle of orchestration and domain sessions

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, TransitionResult};
use crate::vocabulary::DomainStateMachine;

pub const LIFECYCLE_DOMAIN: &str = "lifecycle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Created,
    Active,
    Suspended,
    Failed,
    Completed,
    Archived,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 6] = [
        LifecycleState::Created,
        LifecycleState::Active,
        LifecycleState::Suspended,
        LifecycleState::Failed,
        LifecycleState::Completed,
        LifecycleState::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Suspended => "SUSPENDED",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Completed => "COMPLETED",
            LifecycleState::Archived => "ARCHIVED",
        }
    }

    /// Check `self -> to` against the lifecycle table
    pub fn validate_transition(self, to: LifecycleState) -> TransitionResult<()> {
        lifecycle_state_machine().validate_transition(self.as_str(), to.as_str())
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownState {
                domain: LIFECYCLE_DOMAIN.to_string(),
                state: s.to_string(),
            })
    }
}

static LIFECYCLE: LazyLock<DomainStateMachine> = LazyLock::new(|| {
    DomainStateMachine::new(
        LIFECYCLE_DOMAIN,
        LifecycleState::ALL.iter().map(|s| s.as_str()),
        "CREATED",
        [
            ("CREATED", vec!["ACTIVE", "FAILED", "SUSPENDED"]),
            ("ACTIVE", vec!["COMPLETED", "FAILED", "SUSPENDED"]),
            ("SUSPENDED", vec!["ACTIVE", "FAILED", "ARCHIVED"]),
            ("FAILED", vec!["CREATED", "ARCHIVED"]),
            ("COMPLETED", vec!["ARCHIVED"]),
        ],
    )
    .expect("lifecycle table only names declared states")
});

/// The machine shared by orchestration sessions and domain sessions
pub fn lifecycle_state_machine() -> &'static DomainStateMachine {
    &LIFECYCLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lifecycle_table() {
        use LifecycleState::*;
        assert!(Created.validate_transition(Active).is_ok());
        assert!(Active.validate_transition(Completed).is_ok());
        assert!(Failed.validate_transition(Created).is_ok());
        assert!(Suspended.validate_transition(Archived).is_ok());

        assert!(Created.validate_transition(Completed).is_err());
        assert!(Active.validate_transition(Active).is_err());
        assert!(Completed.validate_transition(Active).is_err());
        assert!(Archived.validate_transition(Created).is_err());
    }

    #[test]
    fn test_archived_is_terminal() {
        assert_eq!(lifecycle_state_machine().terminal_states(), vec!["ARCHIVED"]);
        assert_eq!(lifecycle_state_machine().initial_state(), "CREATED");
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("SUSPENDED".parse::<LifecycleState>().unwrap(), LifecycleState::Suspended);
        assert_eq!(LifecycleState::Failed.to_string(), "FAILED");
        assert!(matches!(
            "PAUSED".parse::<LifecycleState>(),
            Err(TransitionError::UnknownState { .. })
        ));
        assert_eq!(
            serde_json::to_string(&LifecycleState::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }
}
