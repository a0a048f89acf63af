//! Release condition evaluation.
//!
//! A vault carries exactly one [`TriggerCondition`]. Evaluation is a pure
//! function of the condition and the supplied time: re-evaluating the same
//! `(condition, now)` pair always produces the same result, and no
//! background polling is part of the engine. Callers decide when to
//! re-check.
//!
//! Manual activation is monotonic: once activated, a manual trigger stays
//! satisfied. Oracle verification is fed by an external attestation source;
//! this engine only consumes the boolean.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from trigger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TriggerError {
    /// Manual activation was attempted on a non-manual condition.
    #[error("manual activation requires a manual trigger, found {actual}")]
    InvalidTriggerType {
        /// The actual condition variant.
        actual: String,
    },
}

/// The release condition configured on a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Satisfied once wall-clock time reaches `release_at`.
    Time {
        /// Release time in seconds since the UNIX epoch.
        release_at: u64,
    },
    /// Satisfied once explicitly activated; activation is irreversible.
    Manual {
        /// Whether the trigger has been activated.
        activated: bool,
    },
    /// Satisfied once an external attestation sets `verified`.
    Oracle {
        /// Whether the external oracle has attested.
        verified: bool,
    },
}

/// Result of evaluating a trigger condition at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvaluation {
    /// Whether the condition is currently satisfied.
    pub is_satisfied: bool,
    /// Seconds until a time trigger fires; `None` when satisfied or when
    /// the condition has no time component.
    pub remaining_seconds: Option<u64>,
}

/// Countdown breakdown of a time trigger's remaining delay, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingTime {
    /// Whole days remaining.
    pub days: u64,
    /// Hours remaining after whole days.
    pub hours: u64,
    /// Minutes remaining after whole hours.
    pub minutes: u64,
    /// Seconds remaining after whole minutes.
    pub seconds: u64,
}

impl TriggerCondition {
    /// Evaluates the condition at `now`. Pure and idempotent.
    #[must_use]
    pub const fn evaluate(&self, now: u64) -> TriggerEvaluation {
        match *self {
            Self::Time { release_at } => {
                if now >= release_at {
                    TriggerEvaluation {
                        is_satisfied: true,
                        remaining_seconds: None,
                    }
                } else {
                    TriggerEvaluation {
                        is_satisfied: false,
                        remaining_seconds: Some(release_at - now),
                    }
                }
            }
            Self::Manual { activated } => TriggerEvaluation {
                is_satisfied: activated,
                remaining_seconds: None,
            },
            Self::Oracle { verified } => TriggerEvaluation {
                is_satisfied: verified,
                remaining_seconds: None,
            },
        }
    }

    /// Activates a manual trigger, returning the updated condition.
    ///
    /// Activation is monotonic: an already-activated trigger stays
    /// activated.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::InvalidTriggerType`] if the condition is
    /// not [`TriggerCondition::Manual`].
    pub fn activate_manual(self) -> Result<Self, TriggerError> {
        match self {
            Self::Manual { .. } => Ok(Self::Manual { activated: true }),
            other => Err(TriggerError::InvalidTriggerType {
                actual: other.kind().to_string(),
            }),
        }
    }

    /// Returns the condition variant name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Time { .. } => "time",
            Self::Manual { .. } => "manual",
            Self::Oracle { .. } => "oracle",
        }
    }
}

impl TriggerEvaluation {
    /// Splits `remaining_seconds` into a display countdown.
    #[must_use]
    pub const fn remaining_breakdown(&self) -> Option<RemainingTime> {
        match self.remaining_seconds {
            Some(remaining) => Some(RemainingTime {
                days: remaining / 86_400,
                hours: remaining % 86_400 / 3_600,
                minutes: remaining % 3_600 / 60,
                seconds: remaining % 60,
            }),
            None => None,
        }
    }
}
