use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use prepwise_core::error::PrepwiseError;

/// Lifecycle of a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    #[default]
    Inactive,
    Connecting,
    Active,
    Finished,
}

impl CallStatus {
    pub const ALL: [CallStatus; 4] = [
        CallStatus::Inactive,
        CallStatus::Connecting,
        CallStatus::Active,
        CallStatus::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Connecting => "CONNECTING",
            Self::Active => "ACTIVE",
            Self::Finished => "FINISHED",
        }
    }

    /// States reachable in one step.
    ///
    /// `Connecting -> Inactive` is reserved for local start failures; callers
    /// must not drive it from SDK events.
    pub fn successors(&self) -> &'static [CallStatus] {
        match self {
            Self::Inactive => &[Self::Connecting],
            Self::Connecting => &[Self::Active, Self::Inactive],
            Self::Active => &[Self::Finished],
            Self::Finished => &[],
        }
    }

    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        self.successors().contains(&next)
    }

    /// Validate a move to `next`, returning the new state.
    pub fn transition(self, next: CallStatus) -> Result<CallStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid call transition {from} -> {to}")]
pub struct TransitionError {
    pub from: CallStatus,
    pub to: CallStatus,
}

impl From<TransitionError> for PrepwiseError {
    fn from(err: TransitionError) -> Self {
        PrepwiseError::Call(err.to_string())
    }
}
