/// Recovery phase definitions for the cooldown state machine
///
/// This module defines the phases the harvester moves through when the remote
/// endpoint terminates its session.
use std::fmt;

/// Represents where the harvester is in the session-recovery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecoveryPhase {
    /// Queries are issued normally
    #[default]
    Normal,

    /// Session was lost; all attempts are suspended for the cooldown interval
    CoolingDown,

    /// Cooldown elapsed; a fresh session has been requested and the
    /// checkpointed query is about to be re-issued
    Recovering,
}

impl RecoveryPhase {
    /// Returns true if moving from this phase to `next` is a legal transition
    ///
    /// `Recovering -> CoolingDown` covers a session that is lost again on
    /// the very first attempt after a refresh.
    pub fn can_transition_to(&self, next: RecoveryPhase) -> bool {
        matches!(
            (self, next),
            (Self::Normal, Self::CoolingDown)
                | (Self::CoolingDown, Self::Recovering)
                | (Self::Recovering, Self::Normal)
                | (Self::Recovering, Self::CoolingDown)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::CoolingDown => "cooling_down",
            Self::Recovering => "recovering",
        }
    }
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
