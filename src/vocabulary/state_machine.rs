//! Per-domain state machines
//!
//! The transition table is the only source of truth: a pair is legal when it
//! is listed, and nothing else is.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, TransitionResult, VocabularyError, VocabularyResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStateMachine {
    domain: String,
    states: Vec<String>,
    initial_state: String,
    transitions: BTreeMap<String, BTreeSet<String>>,
}

impl DomainStateMachine {
    /// Build a machine from its states and `(from, [to...])` table. Every
    /// state named anywhere must be declared.
    pub fn new<S, T, F, I>(
        domain: impl Into<String>,
        states: S,
        initial_state: impl Into<String>,
        table: T,
    ) -> VocabularyResult<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator<Item = (F, I)>,
        F: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let domain = domain.into();
        let mut declared: Vec<String> = Vec::new();
        for state in states {
            let state = state.into();
            if !declared.contains(&state) {
                declared.push(state);
            }
        }

        let machine = Self {
            initial_state: initial_state.into(),
            transitions: table
                .into_iter()
                .map(|(from, to)| (from.into(), to.into_iter().map(Into::into).collect()))
                .collect(),
            states: declared,
            domain,
        };
        machine.check_declared()?;
        Ok(machine)
    }

    fn check_declared(&self) -> VocabularyResult<()> {
        let undeclared = std::iter::once(&self.initial_state)
            .chain(self.transitions.keys())
            .chain(self.transitions.values().flatten())
            .find(|s| !self.has_state(s));

        match undeclared {
            Some(state) => Err(VocabularyError::InvalidState {
                state: state.clone(),
                domain: self.domain.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Declared states in declaration order
    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }

    /// States directly reachable from `state`
    pub fn next_states(&self, state: &str) -> Vec<&str> {
        self.transitions
            .get(state)
            .map(|to| to.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// States with no outgoing transitions
    pub fn terminal_states(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|s| self.transitions.get(*s).map_or(true, BTreeSet::is_empty))
            .map(String::as_str)
            .collect()
    }

    /// Check `from -> to` against the table. Self-transitions are only
    /// legal when listed.
    pub fn validate_transition(&self, from: &str, to: &str) -> TransitionResult<()> {
        for state in [from, to] {
            if !self.has_state(state) {
                return Err(TransitionError::UnknownState {
                    domain: self.domain.clone(),
                    state: state.to_string(),
                });
            }
        }

        if self
            .transitions
            .get(from)
            .is_some_and(|targets| targets.contains(to))
        {
            Ok(())
        } else {
            Err(TransitionError::IllegalTransition {
                domain: self.domain.clone(),
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}
