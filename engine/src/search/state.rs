//! Per-generation state machine
//!
//! ```text
//! Proposing ──ok──▶ Evaluating(1) ──pass──▶ Committed
//!     │                 │  ▲
//!     │          fail   │  │ repaired
//!     │                 ▼  │
//!     │           DebugRepair(n) ──oracle error──▶ Abandoned
//!     └──────────────oracle error──────────────────▶ Abandoned
//! ```
//!
//! A shape error or an exhausted debug budget also ends in `Abandoned`.

use sdk::errors::EngineError;
use sdk::types::Candidate;
use std::fmt;

use crate::meta_agent::Conversation;

/// Where a generation attempt currently stands
#[derive(Debug, Clone)]
pub enum GenerationState {
    /// Waiting on the proposal and its reflexion rounds
    Proposing,

    /// Evaluating `proposal`; `attempt` counts from 1
    Evaluating {
        attempt: u32,
        proposal: Candidate,
        conversation: Conversation,
    },

    /// Asking the meta-agent to fix `proposal` after a failed attempt
    DebugRepair {
        attempt: u32,
        proposal: Candidate,
        conversation: Conversation,
        observation: String,
    },

    /// Scored candidate, ready to append
    Committed(Candidate),

    Abandoned { reason: String },
}

impl GenerationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed(_) | Self::Abandoned { .. })
    }

    /// Transition out of a failed evaluation attempt
    ///
    /// Repairs while attempts remain, otherwise abandons with
    /// [`EngineError::DebugBudgetExhausted`].
    pub fn after_failure(
        attempt: u32,
        debug_max: u32,
        proposal: Candidate,
        conversation: Conversation,
        observation: String,
    ) -> Self {
        if attempt < debug_max {
            Self::DebugRepair {
                attempt,
                proposal,
                conversation,
                observation,
            }
        } else {
            Self::Abandoned {
                reason: EngineError::DebugBudgetExhausted { attempts: attempt }.to_string(),
            }
        }
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposing => write!(f, "proposing"),
            Self::Evaluating { attempt, .. } => write!(f, "evaluating({})", attempt),
            Self::DebugRepair { attempt, .. } => write!(f, "debug_repair({})", attempt),
            Self::Committed(_) => write!(f, "committed"),
            Self::Abandoned { .. } => write!(f, "abandoned"),
        }
    }
}
