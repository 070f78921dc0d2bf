//! Per-kind state machines

use crate::category::CategoryId;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Edge of a state machine, labelled by an action identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub action: CategoryId,
    pub to: String,
}

/// Declarative graph of named states and action-labelled edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachine {
    pub initial: String,
    pub states: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,
}

impl StateMachine {
    /// Create a machine whose only state is `initial`
    pub fn new(initial: impl Into<String>) -> Self {
        let initial = initial.into();
        Self {
            states: vec![initial.clone()],
            initial,
            transitions: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        let state = state.into();
        if !self.states.contains(&state) {
            self.states.push(state);
        }
        self
    }

    /// Add an edge; both endpoints are added to the state set
    pub fn with_transition(
        mut self,
        from: impl Into<String>,
        action: CategoryId,
        to: impl Into<String>,
    ) -> Self {
        let from = from.into();
        let to = to.into();
        self = self.with_state(from.clone()).with_state(to.clone());
        self.transitions.push(Transition { from, action, to });
        self
    }

    /// Check structural consistency
    ///
    /// The initial state and every edge endpoint must be declared, and a
    /// `(state, action)` pair may lead to one target only.
    pub fn validate(&self, kind: &CategoryId) -> Result<()> {
        let invalid = |message: String| CoreError::InvalidStateMachine {
            kind: kind.to_string(),
            message,
        };

        if !self.states.contains(&self.initial) {
            return Err(invalid(format!(
                "initial state '{}' is not declared",
                self.initial
            )));
        }

        for (i, t) in self.transitions.iter().enumerate() {
            for endpoint in [&t.from, &t.to] {
                if !self.states.contains(endpoint) {
                    return Err(invalid(format!("state '{}' is not declared", endpoint)));
                }
            }
            let clash = self.transitions[..i]
                .iter()
                .any(|o| o.from == t.from && o.action == t.action && o.to != t.to);
            if clash {
                return Err(invalid(format!(
                    "action {} leads to several states from '{}'",
                    t.action, t.from
                )));
            }
        }

        Ok(())
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }

    /// Target state of the edge `(state, action)`, if declared
    pub fn next_state(&self, state: &str, action: &CategoryId) -> Option<&str> {
        self.transitions
            .iter()
            .find(|t| t.from == state && &t.action == action)
            .map(|t| t.to.as_str())
    }

    /// Like [`next_state`](Self::next_state) but fails with
    /// `InvalidStateTransition` when the edge is absent
    pub fn transition(&self, state: &str, action: &CategoryId) -> Result<&str> {
        self.next_state(state, action)
            .ok_or_else(|| CoreError::InvalidStateTransition {
                state: state.to_string(),
                action: action.to_string(),
            })
    }

    /// Actions with an outgoing edge from `state`, in declaration order
    pub fn actions_from(&self, state: &str) -> Vec<CategoryId> {
        let mut actions: Vec<CategoryId> = Vec::new();
        for t in self.transitions.iter().filter(|t| t.from == state) {
            if !actions.contains(&t.action) {
                actions.push(t.action.clone());
            }
        }
        actions
    }
}
