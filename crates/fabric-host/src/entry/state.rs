//! The shared state-machine shape both entry kinds are built from (spec
//! §9 design note: "state machines as values, not inheritance" — each
//! state enum just answers "what can follow me", and the generic `Fsm<S>`
//! in `super::fsm` does the actual transition bookkeeping once).

use std::fmt;

/// Implemented by an entry kind's state enum. `allowed_transition` encodes
/// exactly the table in spec §4.1 for that entry kind.
pub trait ServiceState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Terminal states are never re-entered; an entry that reaches one is
    /// retired, not recycled (spec §3 invariants).
    fn is_terminal(self) -> bool;

    /// Whether transitioning from `self` to `to` is legal, ignoring abort
    /// (abort has its own universal rule, applied by `Fsm::abort`).
    fn allowed_transition(self, to: Self) -> bool;

    /// The state `abort` drives any non-terminal state to.
    fn aborted() -> Self;

    /// The state an error during a transition lands in.
    fn failed() -> Self;
}

/// Application-service states (spec §4.1, app-service form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Inactive,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
    Aborted,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ServiceState for AppState {
    fn is_terminal(self) -> bool {
        matches!(self, AppState::Aborted | AppState::Stopped)
    }

    fn allowed_transition(self, to: Self) -> bool {
        use AppState::*;
        matches!(
            (self, to),
            (Inactive, Starting)
                | (Starting, Started)
                | (Started, Stopping)
                | (Stopping, Stopped)
                | (Starting, Failed)
                | (Stopping, Failed)
        )
    }

    fn aborted() -> Self {
        AppState::Aborted
    }

    fn failed() -> Self {
        AppState::Failed
    }
}

/// Hosted-service states (spec §4.1: "the same shape plus an in-place
/// `Updating` branch off `Initialized`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedState {
    Inactive,
    Initializing,
    Initialized,
    Updating,
    Deactivating,
    Deactivated,
    Failed,
    Aborted,
}

impl fmt::Display for HostedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ServiceState for HostedState {
    fn is_terminal(self) -> bool {
        matches!(self, HostedState::Aborted | HostedState::Deactivated)
    }

    fn allowed_transition(self, to: Self) -> bool {
        use HostedState::*;
        matches!(
            (self, to),
            (Inactive, Initializing)
                | (Initializing, Initialized)
                | (Initialized, Updating)
                | (Updating, Initialized)
                | (Initialized, Deactivating)
                | (Deactivating, Deactivated)
                | (Initializing, Failed)
                | (Updating, Failed)
                | (Deactivating, Failed)
        )
    }

    fn aborted() -> Self {
        HostedState::Aborted
    }

    fn failed() -> Self {
        HostedState::Failed
    }
}
