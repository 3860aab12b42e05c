//! Election lifecycle state machine with explicit phases and legal transitions.
//!
//! The controller drives an election from `NotStarted` through `Validating`
//! to `Running`; the loop then takes it to `Exhausted`, `Terminating` and
//! `Complete`. Every transition is checked against the table below and kept
//! in a log so a finished run can be inspected.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Phases of one election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionPhase {
    /// Trigger received, nothing checked yet.
    NotStarted,
    /// Resolving ids, reading settings, building pools.
    Validating,
    /// Loop is cycling through selections.
    Running,
    /// Member pool drained.
    Exhausted,
    /// Announcing completion and clearing the live marker.
    Terminating,
    /// Terminal: every member was selected.
    Complete,
    /// Terminal: validation failed or the run was cancelled.
    Aborted,
}

impl ElectionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }
}

impl fmt::Display for ElectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Validating => write!(f, "Validating"),
            Self::Running => write!(f, "Running"),
            Self::Exhausted => write!(f, "Exhausted"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Complete => write!(f, "Complete"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// ```text
/// NotStarted  → Validating
/// Validating  → Running
/// Running     → Exhausted
/// Exhausted   → Terminating
/// Terminating → Complete
/// any non-terminal → Aborted
/// ```
fn is_legal_transition(from: ElectionPhase, to: ElectionPhase) -> bool {
    use ElectionPhase::*;

    if to == Aborted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (NotStarted, Validating)
            | (Validating, Running)
            | (Running, Exhausted)
            | (Exhausted, Terminating)
            | (Terminating, Complete)
    )
}

/// A single recorded phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ElectionPhase,
    pub to: ElectionPhase,
    /// Selection cycle at the time of the transition (0 before the loop).
    pub cycle: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal election transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: ElectionPhase,
    pub to: ElectionPhase,
}

/// Election lifecycle tracker.
#[derive(Debug)]
pub struct ElectionStateMachine {
    current: ElectionPhase,
    cycle: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl ElectionStateMachine {
    pub fn new() -> Self {
        Self {
            current: ElectionPhase::NotStarted,
            cycle: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> ElectionPhase {
        self.current
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn set_cycle(&mut self, cycle: u32) {
        self.cycle = cycle;
    }

    /// Move to `to` if the transition table allows it.
    pub fn advance(
        &mut self,
        to: ElectionPhase,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            cycle = self.cycle,
            "Election phase transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            cycle: self.cycle,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Abort from any non-terminal phase.
    pub fn abort(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(ElectionPhase::Aborted, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    /// One-line history, e.g. `NotStarted → Complete (12ms, 5 transitions)`.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} → {} ({}ms, {} transitions)",
            ElectionPhase::NotStarted,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !self.transitions.is_empty() {
            let phases: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
            summary.push_str(&format!(" [{}]", phases.join(" → ")));
        }
        summary
    }
}

impl Default for ElectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
