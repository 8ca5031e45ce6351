//! Autosave state machine
//!
//! ```text
//! Idle -> Saving -> { Idle, Conflicted, AuthExpired }
//! Conflicted -> Idle      (after resolution)
//! AuthExpired -> Idle     (after re-authentication, on the next tick)
//! ```

use draftsync_core::SyncError;

/// Autosave state of one draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutosaveState {
    /// Nothing outstanding
    #[default]
    Idle,
    /// A remote save is in flight
    Saving,
    /// Waiting for the user to resolve a conflict
    Conflicted,
    /// Waiting for re-authentication
    AuthExpired,
}

impl AutosaveState {
    /// Stable name for logs and errors
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Conflicted => "conflicted",
            Self::AuthExpired => "auth_expired",
        }
    }
}

impl std::fmt::Display for AutosaveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: AutosaveState) -> Vec<AutosaveState> {
    use AutosaveState::*;
    match from {
        Idle => vec![Saving],
        Saving => vec![Idle, Conflicted, AuthExpired],
        Conflicted => vec![Idle],
        AuthExpired => vec![Idle],
    }
}

/// Validates a state transition.
///
/// # Errors
/// `SyncError::InvalidTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: AutosaveState, to: AutosaveState) -> Result<(), SyncError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SyncError::InvalidTransition {
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn saving_fans_out() {
        assert!(validate_transition(AutosaveState::Idle, AutosaveState::Saving).is_ok());
        assert!(validate_transition(AutosaveState::Saving, AutosaveState::Conflicted).is_ok());
        assert!(validate_transition(AutosaveState::Saving, AutosaveState::AuthExpired).is_ok());

        // Invalid
        assert!(validate_transition(AutosaveState::Conflicted, AutosaveState::Saving).is_err());
        assert!(validate_transition(AutosaveState::Idle, AutosaveState::Conflicted).is_err());
        assert!(validate_transition(AutosaveState::Saving, AutosaveState::Saving).is_err());
    }

    fn state() -> impl Strategy<Value = AutosaveState> {
        prop_oneof![
            Just(AutosaveState::Idle),
            Just(AutosaveState::Saving),
            Just(AutosaveState::Conflicted),
            Just(AutosaveState::AuthExpired),
        ]
    }

    proptest! {
        #[test]
        fn prop_validation_agrees_with_allowed(from in state(), to in state()) {
            let allowed = allowed_transitions(from);
            prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
        }
    }
}
