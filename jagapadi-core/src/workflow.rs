//! The four-state detection workflow.
//!
//! ```text
//! Initial ──▶ ImageReady ──▶ Processing ──▶ Results
//!    ▲           │  ▲            │             │
//!    └───────────┘  └────────────┘             │
//!    ▲              ▲ (re-run)                 │
//!    └──────────────┴──────────────────────────┘
//! ```
//!
//! Transitions outside the table are refused and logged; the state is left
//! untouched. Every accepted transition is broadcast as a [`StateChange`].

use tokio::sync::{broadcast, watch};

use crate::error::{Error, Result};
use crate::types::{StateChange, WorkflowState};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Owner of the current [`WorkflowState`].
pub struct WorkflowStateMachine {
    state: watch::Sender<WorkflowState>,
    changes: broadcast::Sender<StateChange>,
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        let (state, _) = watch::channel(WorkflowState::Initial);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { state, changes }
    }

    /// Current state.
    pub fn current(&self) -> WorkflowState {
        *self.state.borrow()
    }

    /// Attempt a transition to `target`.
    pub fn transition(&self, target: WorkflowState) -> Result<StateChange> {
        let mut previous = target;
        let applied = self.state.send_if_modified(|state| {
            previous = *state;
            if state.can_transition_to(target) {
                *state = target;
                true
            } else {
                false
            }
        });

        if !applied {
            tracing::warn!(from = %previous, to = %target, "Rejected workflow transition");
            return Err(Error::InvalidTransition {
                from: previous,
                to: target,
            });
        }

        let change = StateChange {
            previous,
            current: target,
        };
        tracing::info!(from = %previous, to = %target, "Workflow transition");
        // No subscribers is fine.
        let _ = self.changes.send(change);
        Ok(change)
    }

    /// Return to `Initial` from any state except `Processing`.
    ///
    /// Returns the state the machine is in afterwards.
    pub fn reset_unless_processing(&self) -> WorkflowState {
        match self.current() {
            WorkflowState::Initial | WorkflowState::Processing => self.current(),
            _ => match self.transition(WorkflowState::Initial) {
                Ok(change) => change.current,
                Err(_) => self.current(),
            },
        }
    }

    /// Subscribe to `(previous, current)` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Watch the current state (latest value only).
    pub fn watch(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }
}
