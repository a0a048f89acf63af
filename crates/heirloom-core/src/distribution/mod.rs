//! Proportional batch distribution across beneficiaries.
//!
//! Given a total amount and a validated allocation table, the distributor
//! computes per-beneficiary shares with integer arithmetic and drives
//! sequential transfer attempts through an injected
//! [`TransferCapability`]. Sequential execution is required: every
//! transfer draws from one shared allowance, so debits must be serialized
//! against a single counter.
//!
//! The distributor is partial-failure tolerant: each attempt's outcome is
//! recorded independently, one beneficiary's failure never aborts the
//! rest, and partial success is a reportable result, not an error. It
//! never retries a failed transfer; retry policy belongs to the
//! orchestrator's caller.
//!
//! # Rounding
//!
//! Shares are floored, and the running total is clamped so the sum of
//! computed shares can never exceed the input total. The leftover
//! rounding dust is reported as `undistributed` and stays in the vault.


use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::amount::{allocations_balanced, Amount};
use crate::delegation::DelegationLink;
use crate::vault::{AssetType, Beneficiary};

/// Errors that invalidate a whole batch before any transfer is attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DistributionError {
    /// The allocation table does not sum to 100% within tolerance.
    #[error("allocation table sums to {sum_bps} hundredths of a percent, expected 10000 +/- 1")]
    InvalidAllocationTable {
        /// The actual sum in hundredths of a percent.
        sum_bps: u64,
    },

    /// No beneficiaries to distribute to.
    #[error("no beneficiaries provided for distribution")]
    NoBeneficiaries,
}

/// Failure from the external transfer capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transfer rejected: {reason}")]
pub struct TransferError {
    /// Why the submission failed.
    pub reason: String,
}

/// Receipt for a submitted and confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// External identifier for the confirmed transfer.
    pub receipt_id: String,
}

/// External transfer capability: on-chain submission and confirmation,
/// abstracted to success/failure plus an identifier.
#[async_trait]
pub trait TransferCapability: Send + Sync {
    /// Transfers `amount` to `to`, presenting the delegation chain as
    /// spending authority.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if submission or confirmation fails.
    async fn transfer(
        &self,
        to: &str,
        amount: Amount,
        asset_type: &AssetType,
        chain: &[DelegationLink],
    ) -> Result<TransferReceipt, TransferError>;
}

/// Why an individual transfer attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    /// The transfer capability reported a failure.
    TransferFailed {
        /// The capability's failure reason.
        reason: String,
    },
    /// The transfer did not complete within the caller-supplied bound.
    Timeout {
        /// The timeout that elapsed, in seconds.
        limit_secs: u64,
    },
}

/// Outcome of one beneficiary's transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The transfer confirmed.
    Success {
        /// Receipt identifier from the transfer capability.
        receipt_id: String,
    },
    /// The transfer failed; subsequent beneficiaries still proceed.
    Failed {
        /// The failure cause.
        cause: FailureCause,
    },
}

/// One beneficiary's attempt within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferOutcome {
    /// The beneficiary address.
    pub beneficiary: String,
    /// The share attempted.
    pub amount: Amount,
    /// How the attempt ended.
    pub status: OutcomeStatus,
}

impl TransferOutcome {
    /// Returns true if this attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }
}

/// Aggregate status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every beneficiary succeeded.
    Success,
    /// Some beneficiaries succeeded, some failed.
    Partial,
    /// No beneficiary succeeded.
    Failed,
}

impl OverallStatus {
    /// Returns the string representation of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one batch distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchExecutionResult {
    /// Per-beneficiary outcomes, in attempt order.
    pub outcomes: Vec<TransferOutcome>,
    /// Sum of successfully transferred shares only.
    pub total_distributed: Amount,
    /// Rounding dust left with the vault (total minus all computed
    /// shares, independent of transfer outcomes).
    pub undistributed: Amount,
    /// Aggregate batch status.
    pub overall_status: OverallStatus,
}

impl BatchExecutionResult {
    /// Successful attempts, in order.
    pub fn successful(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    /// Failed attempts, in order.
    pub fn failed(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Number of successful attempts.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successful().count()
    }

    /// Number of failed attempts.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }
}

/// Computes each beneficiary's floored share of `total`, clamped so the
/// running sum never exceeds `total`.
pub(crate) fn compute_shares(total: Amount, beneficiaries: &[Beneficiary]) -> Vec<Amount> {
    let mut headroom = total;
    beneficiaries
        .iter()
        .map(|b| {
            let share = b.allocation.share_of(total).min(headroom);
            headroom -= share;
            share
        })
        .collect()
}

/// Sequential batch distributor with a per-transfer timeout bound.
#[derive(Debug, Clone)]
pub struct BatchDistributor {
    per_transfer_timeout: Duration,
}

impl BatchDistributor {
    /// Creates a distributor bounding each transfer by `per_transfer_timeout`.
    #[must_use]
    pub const fn new(per_transfer_timeout: Duration) -> Self {
        Self {
            per_transfer_timeout,
        }
    }

    /// Distributes `total` across `beneficiaries` in list order.
    ///
    /// A timed-out transfer is recorded as failed with a
    /// [`FailureCause::Timeout`] and does not block subsequent
    /// beneficiaries.
    ///
    /// # Errors
    ///
    /// Returns [`DistributionError`] only for whole-batch input problems
    /// (empty or unbalanced allocation table); individual transfer
    /// failures are reported per beneficiary in the result.
    pub async fn distribute(
        &self,
        total: Amount,
        beneficiaries: &[Beneficiary],
        chain: &[DelegationLink],
        asset_type: &AssetType,
        transfer: &dyn TransferCapability,
    ) -> Result<BatchExecutionResult, DistributionError> {
        if beneficiaries.is_empty() {
            return Err(DistributionError::NoBeneficiaries);
        }
        let sum_bps: u64 = beneficiaries
            .iter()
            .map(|b| u64::from(b.allocation.as_bps()))
            .sum();
        if !allocations_balanced(sum_bps) {
            return Err(DistributionError::InvalidAllocationTable { sum_bps });
        }

        let shares = compute_shares(total, beneficiaries);
        let undistributed = total - shares.iter().sum::<Amount>();

        let mut outcomes = Vec::with_capacity(beneficiaries.len());
        let mut total_distributed: Amount = 0;

        for (beneficiary, share) in beneficiaries.iter().zip(shares) {
            debug!(
                beneficiary = %beneficiary.address,
                amount = share,
                "attempting beneficiary transfer"
            );
            let status = match tokio::time::timeout(
                self.per_transfer_timeout,
                transfer.transfer(&beneficiary.address, share, asset_type, chain),
            )
            .await
            {
                Ok(Ok(receipt)) => {
                    total_distributed += share;
                    OutcomeStatus::Success {
                        receipt_id: receipt.receipt_id,
                    }
                }
                Ok(Err(err)) => {
                    warn!(
                        beneficiary = %beneficiary.address,
                        error = %err,
                        "beneficiary transfer failed"
                    );
                    OutcomeStatus::Failed {
                        cause: FailureCause::TransferFailed {
                            reason: err.reason,
                        },
                    }
                }
                Err(_elapsed) => {
                    warn!(
                        beneficiary = %beneficiary.address,
                        limit_secs = self.per_transfer_timeout.as_secs(),
                        "beneficiary transfer timed out"
                    );
                    OutcomeStatus::Failed {
                        cause: FailureCause::Timeout {
                            limit_secs: self.per_transfer_timeout.as_secs(),
                        },
                    }
                }
            };
            outcomes.push(TransferOutcome {
                beneficiary: beneficiary.address.clone(),
                amount: share,
                status,
            });
        }

        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        let overall_status = if success_count == outcomes.len() {
            OverallStatus::Success
        } else if success_count == 0 {
            OverallStatus::Failed
        } else {
            OverallStatus::Partial
        };

        Ok(BatchExecutionResult {
            outcomes,
            total_distributed,
            undistributed,
            overall_status,
        })
    }
}
