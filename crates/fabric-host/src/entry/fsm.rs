use fabric_core::Error;

use super::state::ServiceState;

/// A plain value wrapping the current state plus the two rules every
/// entry kind needs: "is this transition in the table" and "abort is
/// legal from anything but Aborted itself". Holding the per-entry lock
/// (spec §4.1, §5) around a `Fsm` for the duration of an operation is
/// what makes that operation linearizable with respect to its siblings.
#[derive(Debug)]
pub struct Fsm<S: ServiceState> {
    state: S,
}

impl<S: ServiceState> Fsm<S> {
    pub fn new(initial: S) -> Self {
        Fsm { state: initial }
    }

    pub fn state(&self) -> S {
        self.state
    }

    /// Apply a table-driven transition. Illegal transitions are reported,
    /// never silently dropped (spec §4.1).
    pub fn transition(&mut self, to: S) -> Result<(), Error> {
        if self.state.is_terminal() {
            return Err(Error::invalid_state(format!(
                "cannot transition out of terminal state {:?}",
                self.state
            )));
        }
        if !self.state.allowed_transition(to) {
            return Err(Error::invalid_state(format!(
                "illegal transition {:?} -> {:?}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// Move to `Failed` unconditionally; used when a launcher or teardown
    /// call errors mid-operation and the table-driven path can't apply
    /// (e.g. cancellation of an in-flight `Starting`).
    pub fn force_failed(&mut self) {
        self.state = S::failed();
    }

    /// Bypass the transition table entirely; used only once a forced
    /// teardown has actually completed (spec §5 "cancellation during
    /// Stopping escalates to forced termination") — the entry may be
    /// sitting in `Failed` with no legal path to `Stopped` in the table,
    /// but a completed force-kill still needs to land somewhere terminal.
    pub fn force(&mut self, to: S) {
        self.state = to;
    }

    /// Abort is always legal from a non-terminal state (spec §4.1: "always
    /// legal from any non-terminal state"; §5 cancellation during
    /// Starting/Stopping also routes through here) — a terminal state
    /// (`Aborted` itself, but also `Stopped`/`Deactivated`) is never
    /// re-entered, matching the original's STATEMACHINE_TERMINAL_STATES.
    pub fn abort(&mut self) -> Result<(), Error> {
        if self.state.is_terminal() {
            return Err(Error::invalid_state(format!(
                "cannot abort an entry already in terminal state {:?}",
                self.state
            )));
        }
        self.state = S::aborted();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::state::{AppState, HostedState};

    fn all_app_states() -> [AppState; 7] {
        use AppState::*;
        [Inactive, Starting, Started, Stopping, Stopped, Failed, Aborted]
    }

    fn all_hosted_states() -> [HostedState; 8] {
        use HostedState::*;
        [
            Inactive,
            Initializing,
            Initialized,
            Updating,
            Deactivating,
            Deactivated,
            Failed,
            Aborted,
        ]
    }

    #[test]
    fn app_terminal_states_are_exactly_stopped_and_aborted() {
        for state in all_app_states() {
            let expected = matches!(state, AppState::Stopped | AppState::Aborted);
            assert_eq!(state.is_terminal(), expected, "{:?}", state);
        }
    }

    #[test]
    fn hosted_terminal_states_are_exactly_deactivated_and_aborted() {
        for state in all_hosted_states() {
            let expected = matches!(state, HostedState::Deactivated | HostedState::Aborted);
            assert_eq!(state.is_terminal(), expected, "{:?}", state);
        }
    }

    #[test]
    fn app_abort_succeeds_from_every_non_terminal_state() {
        for state in all_app_states() {
            if state.is_terminal() {
                continue;
            }
            let mut fsm = Fsm::new(state);
            assert!(fsm.abort().is_ok(), "abort should succeed from {:?}", state);
            assert_eq!(fsm.state(), AppState::Aborted);
        }
    }

    #[test]
    fn app_abort_rejected_from_every_terminal_state() {
        for state in all_app_states() {
            if !state.is_terminal() {
                continue;
            }
            let mut fsm = Fsm::new(state);
            assert!(fsm.abort().is_err(), "abort should be rejected from {:?}", state);
            assert_eq!(fsm.state(), state, "state must be unchanged after a rejected abort");
        }
    }

    #[test]
    fn hosted_abort_succeeds_from_every_non_terminal_state() {
        for state in all_hosted_states() {
            if state.is_terminal() {
                continue;
            }
            let mut fsm = Fsm::new(state);
            assert!(fsm.abort().is_ok(), "abort should succeed from {:?}", state);
            assert_eq!(fsm.state(), HostedState::Aborted);
        }
    }

    #[test]
    fn hosted_abort_rejected_from_every_terminal_state() {
        for state in all_hosted_states() {
            if !state.is_terminal() {
                continue;
            }
            let mut fsm = Fsm::new(state);
            assert!(fsm.abort().is_err(), "abort should be rejected from {:?}", state);
            assert_eq!(fsm.state(), state, "state must be unchanged after a rejected abort");
        }
    }

    #[test]
    fn app_transition_table_rejects_every_pair_not_on_the_happy_path() {
        use AppState::*;
        let legal = [
            (Inactive, Starting),
            (Starting, Started),
            (Started, Stopping),
            (Stopping, Stopped),
            (Starting, Failed),
            (Stopping, Failed),
        ];
        for from in all_app_states() {
            for to in all_app_states() {
                let expect_legal = legal.contains(&(from, to));
                assert_eq!(
                    from.allowed_transition(to),
                    expect_legal,
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn hosted_transition_table_rejects_every_pair_not_on_the_happy_path() {
        use HostedState::*;
        let legal = [
            (Inactive, Initializing),
            (Initializing, Initialized),
            (Initialized, Updating),
            (Updating, Initialized),
            (Initialized, Deactivating),
            (Deactivating, Deactivated),
            (Initializing, Failed),
            (Updating, Failed),
            (Deactivating, Failed),
        ];
        for from in all_hosted_states() {
            for to in all_hosted_states() {
                let expect_legal = legal.contains(&(from, to));
                assert_eq!(
                    from.allowed_transition(to),
                    expect_legal,
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn transition_out_of_terminal_state_is_rejected_even_if_table_allows_it() {
        let mut fsm: Fsm<AppState> = Fsm::new(AppState::Stopped);
        assert!(fsm.transition(AppState::Starting).is_err());
        assert_eq!(fsm.state(), AppState::Stopped);
    }

    #[test]
    fn transition_rejects_pairs_absent_from_the_table() {
        let mut fsm: Fsm<AppState> = Fsm::new(AppState::Inactive);
        assert!(fsm.transition(AppState::Stopped).is_err());
        assert_eq!(fsm.state(), AppState::Inactive);
    }

    #[test]
    fn force_bypasses_the_table_unconditionally() {
        let mut fsm: Fsm<HostedState> = Fsm::new(HostedState::Deactivated);
        fsm.force(HostedState::Inactive);
        assert_eq!(fsm.state(), HostedState::Inactive);
    }

    #[test]
    fn force_failed_lands_in_failed_from_any_state() {
        let mut fsm: Fsm<AppState> = Fsm::new(AppState::Starting);
        fsm.force_failed();
        assert_eq!(fsm.state(), AppState::Failed);
    }
}
