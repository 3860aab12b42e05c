//! Election error taxonomy.
//!
//! | Kind         | Raised by                  | Election started? |
//! |--------------|----------------------------|-------------------|
//! | `Resolution` | bad guild / channel ids    | no                |
//! | `State`      | settings, duplicates, pools, ontology marker writes | no |
//! | `Invariant`  | loop preconditions         | loop aborts       |
//!
//! Failures inside a running cycle (role permissions, result recording) are
//! not errors at this level: the loop recovers from them locally.

use std::fmt;

use thiserror::Error;

use crate::types::GuildId;

/// Classification of an [`ElectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    State,
    Invariant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution => write!(f, "resolution"),
            Self::State => write!(f, "state"),
            Self::Invariant => write!(f, "invariant"),
        }
    }
}

/// Errors surfaced by the election controller and loop.
#[derive(Debug, Error)]
pub enum ElectionError {
    /// Guild or channel id is malformed or does not resolve.
    #[error("{0}")]
    Resolution(String),

    /// A live election is already marked for the guild.
    #[error("guild {0} already has an election in progress")]
    AlreadyInProgress(GuildId),

    /// Any other precondition or ontology boundary failure.
    #[error("{0}")]
    State(String),

    /// Loop started with an empty pool. Never expected when going through the
    /// controller.
    #[error("election invariant violated: {0}")]
    Invariant(String),
}

impl ElectionError {
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::AlreadyInProgress(_) | Self::State(_) => ErrorKind::State,
            Self::Invariant(_) => ErrorKind::Invariant,
        }
    }

    /// `true` when the failure is the duplicate-election guard.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::AlreadyInProgress(_))
    }
}
