//! Top-level execution coordination.
//!
//! Each execution attempt walks a fixed state machine:
//!
//! ```text
//! Idle -> Evaluating -> Authorizing -> Distributing -> Completed
//!            |              |               |
//!            `--------------+---------------`--> Aborted
//! ```
//!
//! An aborted attempt is a no-op on all persisted state. A completed
//! attempt commits in a fixed order: debit the permission ledger with the
//! amount actually distributed (never the requested amount), update the
//! vault and its beneficiaries, then append one immutable
//! [`ExecutionRecord`]. The store offers no multi-entity transaction, so
//! a crash between the debit and the record append leaves a
//! debited-but-unrecorded state; this window is accepted and documented
//! rather than auto-recovered.
//!
//! At most one execution is in flight per `(vault_id, permission_id)`
//! pair; a concurrent duplicate is rejected with
//! [`ExecutionError::ExecutionInProgress`] rather than interleaved, since
//! allowance debits must be serialized against a single counter.

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::amount::Amount;
use crate::clock::Clock;
use crate::delegation::{
    build_child_link, build_root_link, validate_chain, DelegationError, SigningCapability,
};
use crate::distribution::{
    BatchDistributor, DistributionError, OverallStatus, TransferCapability, TransferOutcome,
};
use crate::permission::{PermissionError, PermissionLedger};
use crate::store::{RecordStore, StoreError};
use crate::trigger::TriggerError;
use crate::vault::{AssetType, Vault, VaultError};

/// Phases of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// No attempt underway.
    Idle,
    /// Checking the vault's release condition.
    Evaluating,
    /// Checking the allowance and building the delegation chain.
    Authorizing,
    /// Driving per-beneficiary transfers.
    Distributing,
    /// The attempt finished and its record was written.
    Completed,
    /// The attempt stopped before any persisted mutation.
    Aborted,
}

impl ExecutionPhase {
    /// Returns the string representation of this phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Evaluating => "evaluating",
            Self::Authorizing => "authorizing",
            Self::Distributing => "distributing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// Errors terminating an execution attempt before completion.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The vault's release condition is not satisfied.
    #[error("trigger condition not met (remaining: {remaining_seconds:?} seconds)")]
    TriggerNotMet {
        /// Seconds until a time trigger fires, when known.
        remaining_seconds: Option<u64>,
    },

    /// Another execution for the same `(vault, permission)` pair is
    /// already in flight.
    #[error("execution already in progress for vault {vault_id} permission {permission_id}")]
    ExecutionInProgress {
        /// The contended vault.
        vault_id: String,
        /// The contended permission.
        permission_id: String,
    },

    /// The permission does not belong to the requested vault.
    #[error("permission {permission_id} was not granted against vault {vault_id}")]
    PermissionVaultMismatch {
        /// The permission presented.
        permission_id: String,
        /// The vault requested.
        vault_id: String,
    },

    /// The vault has been deactivated.
    #[error("vault {vault_id} is inactive")]
    VaultInactive {
        /// The inactive vault.
        vault_id: String,
    },

    /// Allowance check or debit failure.
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// Delegation chain construction or validation failure.
    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// Whole-batch distribution input failure.
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    /// Trigger operation failure.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// Vault balance failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Optional dual-control verifier for an execution.
///
/// When present, the primary agent re-delegates `scope_amount` of its
/// authority to the verifier agent as an extra chain link before
/// distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierDelegation {
    /// The verifier agent address.
    pub agent_address: String,
    /// The sub-scope re-delegated to the verifier.
    pub scope_amount: Amount,
}

/// One request to execute a vault's distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionRequest {
    /// The vault to distribute from.
    pub vault_id: String,
    /// The permission authorizing the spend.
    pub permission_id: String,
    /// The total amount to distribute.
    pub amount: Amount,
    /// Optional dual-control re-delegation.
    pub verifier: Option<VerifierDelegation>,
}

/// Immutable record of one orchestrated attempt. Append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionRecord {
    /// Unique record identifier.
    pub id: String,
    /// The vault distributed from.
    pub vault_id: String,
    /// The permission debited.
    pub permission_id: String,
    /// The amount the caller requested.
    pub requested_amount: Amount,
    /// Per-beneficiary outcomes, in attempt order.
    pub outcomes: Vec<TransferOutcome>,
    /// Aggregate batch status.
    pub overall_status: OverallStatus,
    /// Sum actually distributed (successful transfers only).
    pub total_distributed: Amount,
    /// When the attempt started, seconds since the UNIX epoch.
    pub started_at: u64,
    /// When the attempt completed, seconds since the UNIX epoch.
    pub completed_at: u64,
}

/// Aggregate view over a vault's execution history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Total recorded attempts.
    pub total_executions: usize,
    /// Attempts where every beneficiary succeeded.
    pub successful: usize,
    /// Attempts with mixed outcomes.
    pub partial: usize,
    /// Attempts where no beneficiary succeeded.
    pub failed: usize,
    /// Lifetime sum distributed across all attempts.
    pub total_distributed: Amount,
}

type InFlightSet = Arc<Mutex<HashSet<(String, String)>>>;

/// RAII guard marking a `(vault, permission)` pair as in flight.
struct InFlightGuard {
    key: (String, String),
    set: InFlightSet,
}

impl InFlightGuard {
    fn acquire(set: &InFlightSet, vault_id: &str, permission_id: &str) -> Option<Self> {
        let key = (vault_id.to_string(), permission_id.to_string());
        let mut in_flight = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(Self {
            key,
            set: Arc::clone(set),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Coordinates trigger evaluation, allowance accounting, delegation chain
/// construction, batch distribution, and history recording.
pub struct ExecutionOrchestrator {
    store: Arc<dyn RecordStore>,
    ledger: PermissionLedger,
    distributor: BatchDistributor,
    clock: Arc<dyn Clock>,
    signer: Arc<dyn SigningCapability>,
    transfer: Arc<dyn TransferCapability>,
    in_flight: InFlightSet,
}

impl ExecutionOrchestrator {
    /// Creates an orchestrator over the given store, clock, and external
    /// capabilities, bounding each transfer by `per_transfer_timeout`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        signer: Arc<dyn SigningCapability>,
        transfer: Arc<dyn TransferCapability>,
        per_transfer_timeout: Duration,
    ) -> Self {
        let ledger = PermissionLedger::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            ledger,
            distributor: BatchDistributor::new(per_transfer_timeout),
            clock,
            signer,
            transfer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The allowance ledger, for grant/revoke dashboard actions.
    #[must_use]
    pub const fn ledger(&self) -> &PermissionLedger {
        &self.ledger
    }

    /// Grants a spending permission against a vault.
    ///
    /// # Errors
    ///
    /// Returns a [`PermissionError`] for a zero ceiling or store failure.
    pub fn grant_permission(
        &self,
        vault_id: &str,
        agent_address: &str,
        asset_type: AssetType,
        max_amount: Amount,
        duration_secs: u64,
    ) -> Result<crate::permission::Permission, ExecutionError> {
        Ok(self
            .ledger
            .grant(vault_id, agent_address, asset_type, max_amount, duration_secs)?)
    }

    /// Revokes a permission. Always terminal.
    ///
    /// # Errors
    ///
    /// Returns a [`PermissionError`] for a store failure.
    pub fn revoke_permission(
        &self,
        permission_id: &str,
    ) -> Result<crate::permission::Permission, ExecutionError> {
        Ok(self.ledger.revoke(permission_id)?)
    }

    /// Activates a vault's manual trigger and persists the vault.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::InvalidTriggerType`] if the vault's
    /// condition is not manual, or a store error.
    pub fn activate_manual_trigger(&self, vault_id: &str) -> Result<Vault, ExecutionError> {
        let mut vault = self.store.get_vault(vault_id)?;
        vault.trigger = vault.trigger.activate_manual()?;
        self.store.put_vault(&vault)?;
        info!(vault_id, "manual trigger activated");
        Ok(vault)
    }

    /// Runs one execution attempt end to end.
    ///
    /// # Errors
    ///
    /// Any [`ExecutionError`] aborts the attempt; aborts perform no
    /// persisted mutation.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionRecord, ExecutionError> {
        let _guard = InFlightGuard::acquire(
            &self.in_flight,
            &request.vault_id,
            &request.permission_id,
        )
        .ok_or_else(|| ExecutionError::ExecutionInProgress {
            vault_id: request.vault_id.clone(),
            permission_id: request.permission_id.clone(),
        })?;

        match self.run(&request).await {
            Ok(record) => {
                info!(
                    execution_id = %record.id,
                    vault_id = %record.vault_id,
                    status = %record.overall_status,
                    total_distributed = record.total_distributed,
                    "execution completed"
                );
                Ok(record)
            }
            Err(err) => {
                warn!(
                    vault_id = %request.vault_id,
                    permission_id = %request.permission_id,
                    reason = %err,
                    "execution aborted"
                );
                Err(err)
            }
        }
    }

    async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionRecord, ExecutionError> {
        let started_at = self.clock.now_secs();

        self.advance(ExecutionPhase::Idle, ExecutionPhase::Evaluating);
        let vault = self.store.get_vault(&request.vault_id)?;
        if !vault.active {
            return Err(ExecutionError::VaultInactive {
                vault_id: vault.id,
            });
        }
        let evaluation = vault.trigger.evaluate(started_at);
        if !evaluation.is_satisfied {
            return Err(ExecutionError::TriggerNotMet {
                remaining_seconds: evaluation.remaining_seconds,
            });
        }

        self.advance(ExecutionPhase::Evaluating, ExecutionPhase::Authorizing);
        let permission = self.ledger.check_usable(&request.permission_id, request.amount)?;
        if permission.vault_id != request.vault_id {
            return Err(ExecutionError::PermissionVaultMismatch {
                permission_id: permission.id,
                vault_id: request.vault_id.clone(),
            });
        }
        if request.amount > vault.balance {
            return Err(VaultError::InsufficientBalance {
                vault_id: vault.id,
                requested: request.amount,
                available: vault.balance,
            }
            .into());
        }

        let root = build_root_link(&vault.owner, &permission, request.amount, &*self.signer)?;
        let mut chain = vec![root];
        if let Some(verifier) = &request.verifier {
            let child = build_child_link(
                &chain[0],
                &verifier.agent_address,
                verifier.scope_amount,
                &*self.signer,
            )?;
            chain.push(child);
        }
        validate_chain(&chain)?;

        self.advance(ExecutionPhase::Authorizing, ExecutionPhase::Distributing);
        let result = self
            .distributor
            .distribute(
                request.amount,
                &vault.beneficiaries,
                &chain,
                &vault.asset_type,
                &*self.transfer,
            )
            .await?;

        // Commit the successful portion only: the ledger and vault track
        // ground truth, never the requested amount. Write order is debit
        // first, record second.
        if result.total_distributed > 0 {
            self.ledger.debit(&permission.id, result.total_distributed)?;

            let mut vault = vault;
            vault.withdraw(result.total_distributed)?;
            for outcome in result.successful() {
                if let Some(beneficiary) = vault
                    .beneficiaries
                    .iter_mut()
                    .find(|b| b.address == outcome.beneficiary)
                {
                    beneficiary.record_receipt(outcome.amount);
                }
            }
            self.store.put_vault(&vault)?;
        }

        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            vault_id: request.vault_id.clone(),
            permission_id: request.permission_id.clone(),
            requested_amount: request.amount,
            outcomes: result.outcomes,
            overall_status: result.overall_status,
            total_distributed: result.total_distributed,
            started_at,
            completed_at: self.clock.now_secs(),
        };
        self.store.append_execution(&record)?;

        self.advance(ExecutionPhase::Distributing, ExecutionPhase::Completed);
        Ok(record)
    }

    /// Aggregates a vault's execution history.
    ///
    /// # Errors
    ///
    /// Returns a store error from the history read.
    pub fn execution_summary(&self, vault_id: &str) -> Result<ExecutionSummary, ExecutionError> {
        let history = self.store.executions_for_vault(vault_id)?;
        let mut summary = ExecutionSummary {
            total_executions: history.len(),
            ..ExecutionSummary::default()
        };
        for record in &history {
            match record.overall_status {
                OverallStatus::Success => summary.successful += 1,
                OverallStatus::Partial => summary.partial += 1,
                OverallStatus::Failed => summary.failed += 1,
            }
            summary.total_distributed += record.total_distributed;
        }
        Ok(summary)
    }

    fn advance(&self, from: ExecutionPhase, to: ExecutionPhase) {
        debug!(from = from.as_str(), to = to.as_str(), "execution phase");
    }
}

impl std::fmt::Debug for ExecutionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOrchestrator")
            .field("distributor", &self.distributor)
            .finish_non_exhaustive()
    }
}
