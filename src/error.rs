use thiserror::Error;

use crate::state::{PlayerId, TeamId};

/// Why an actor was refused for the command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterIssue {
    #[error("{player} is not in the playing XI of {team}")]
    NotInPlayingXi { player: PlayerId, team: TeamId },
    #[error("{player} is already at the crease")]
    DuplicateAssignment { player: PlayerId },
    #[error("{player} has already been dismissed")]
    AlreadyDismissed { player: PlayerId },
    #[error("{player} is not at the crease")]
    NotAtCrease { player: PlayerId },
    #[error("{bowler} bowled the previous over")]
    ConsecutiveOvers { bowler: PlayerId },
    #[error("{bowler} is already bowling")]
    SameBowler { bowler: PlayerId },
    #[error("run out must name the striker or the non-striker")]
    AmbiguousRunOut,
    #[error("{team} is not playing this match")]
    UnknownTeam { team: TeamId },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UndoError {
    #[error("nothing to undo: already at innings start")]
    NothingToUndo,
    #[error("the last entry is already an undo; record a new event first")]
    ConsecutiveUndo,
    #[error("innings is closed to corrections: {0}")]
    InningsClosed(String),
}

/// Error type for scoring commands. None of these are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("roster invalid: {0}")]
    RosterInvalid(#[from] RosterIssue),
    #[error("over {over} is complete: change the bowler first")]
    OverBoundaryPending { over: u32 },
    #[error("overs exhausted")]
    OversExhausted,
    #[error("all out")]
    AllOut,
    #[error("tie-break not applicable")]
    TieBreakNotApplicable,
    #[error("tie-break not allowed: {0}")]
    TieBreakNotAllowed(String),
    #[error("super over already started")]
    SuperOverAlreadyStarted,
    #[error("super over has not concluded")]
    SuperOverPending,
    #[error("another command is being applied")]
    ConcurrentMutationRejected,
    #[error("invalid runs: {runs}")]
    InvalidRuns { runs: u32 },
    #[error("a new batter must be named")]
    NewBatterRequired,
    #[error("undo failed: {0}")]
    Undo(#[from] UndoError),
}

impl CommandError {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        CommandError::InvalidState(reason.into())
    }

    /// The caller can get past this without operator correction.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CommandError::OverBoundaryPending { .. } | CommandError::ConcurrentMutationRejected
        )
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;
