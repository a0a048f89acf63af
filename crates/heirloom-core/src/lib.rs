//! Permission and execution engine for delegated, condition-gated asset
//! release ("digital inheritance").
//!
//! Owners grant scoped, revocable spending permissions to autonomous agent
//! accounts. When a vault's release condition fires, agents execute
//! proportional transfers to beneficiaries within the granted allowance,
//! optionally under dual control via an agent-to-agent re-delegation.
//!
//! # Architecture
//!
//! ```text
//! ExecutionOrchestrator
//!     |-> TriggerCondition::evaluate   (read-only trigger check)
//!     |-> PermissionLedger             (allowance check, later debit)
//!     |-> delegation chain builder     (owner -> executor [-> verifier])
//!     |-> BatchDistributor             (sequential per-beneficiary transfers)
//!     `-> RecordStore                  (execution history, append-only)
//! ```
//!
//! # Key Concepts
//!
//! - **Vault**: an owner-controlled balance subject to inheritance rules.
//! - **Permission**: a time-boxed spending allowance granted to an agent;
//!   the sole piece of mutable shared state is its remaining allowance.
//! - **Delegation chain**: an ordered sequence of re-delegations bounding
//!   sub-allowances from a root permission.
//! - **Batch distribution**: proportional payout across beneficiaries,
//!   tolerating partial failure.
//!
//! # External Capabilities
//!
//! The engine performs no signing, submission, or persistence itself. It
//! consumes [`delegation::SigningCapability`],
//! [`distribution::TransferCapability`], [`store::RecordStore`], and
//! [`clock::Clock`], all injectable with deterministic fakes for testing.

pub mod amount;
pub mod clock;
pub mod delegation;
pub mod distribution;
pub mod orchestrator;
pub mod permission;
pub mod store;
pub mod trigger;
pub mod vault;

pub use amount::{AllocationBps, Amount};
pub use clock::{Clock, ManualClock, SystemClock};
pub use delegation::{
    build_child_link, build_root_link, validate_chain, DelegationError, DelegationLink,
    SigningCapability, SigningRejected,
};
pub use distribution::{
    BatchDistributor, BatchExecutionResult, DistributionError, FailureCause, OutcomeStatus,
    OverallStatus, TransferCapability, TransferError, TransferOutcome, TransferReceipt,
};
pub use orchestrator::{
    ExecutionError, ExecutionOrchestrator, ExecutionPhase, ExecutionRecord, ExecutionRequest,
    ExecutionSummary, VerifierDelegation,
};
pub use permission::{Permission, PermissionError, PermissionLedger, PermissionStatus};
pub use store::{MemoryRecordStore, RecordStore, StoreError};
pub use trigger::{TriggerCondition, TriggerError, TriggerEvaluation};
pub use vault::{AssetType, Beneficiary, Vault, VaultError};
