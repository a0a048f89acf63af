//! End-to-end tests for orchestrated execution attempts.
//!
//! All external capabilities are deterministic fakes: a manual clock, a
//! static signer, and scripted transfer outcomes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::amount::{AllocationBps, Amount};
use crate::clock::ManualClock;
use crate::delegation::{DelegationLink, SigningCapability, SigningRejected};
use crate::distribution::{
    OverallStatus, TransferCapability, TransferError, TransferReceipt,
};
use crate::permission::{PermissionError, PermissionStatus};
use crate::store::{MemoryRecordStore, RecordStore};
use crate::trigger::TriggerCondition;
use crate::vault::{AssetType, Beneficiary, Vault, VaultError};

use super::{
    ExecutionError, ExecutionOrchestrator, ExecutionRequest, VerifierDelegation,
};

const NOW: u64 = 1_700_000_000;
const DAY: u64 = 86_400;
const TIMEOUT: Duration = Duration::from_secs(30);

struct StaticSigner;

impl SigningCapability for StaticSigner {
    fn sign(&self, _payload: &[u8]) -> Result<Vec<u8>, SigningRejected> {
        Ok(vec![0xCD; 65])
    }
}

#[derive(Default)]
struct ScriptedTransfer {
    fail_addresses: HashSet<String>,
    sequence: AtomicU64,
}

#[async_trait]
impl TransferCapability for ScriptedTransfer {
    async fn transfer(
        &self,
        to: &str,
        _amount: Amount,
        _asset_type: &AssetType,
        chain: &[DelegationLink],
    ) -> Result<TransferReceipt, TransferError> {
        assert!(!chain.is_empty(), "transfers must present a delegation chain");
        if self.fail_addresses.contains(to) {
            return Err(TransferError {
                reason: "reverted".to_string(),
            });
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(TransferReceipt {
            receipt_id: format!("receipt-{seq}"),
        })
    }
}

/// Transfer fake that parks until released, to hold an execution in the
/// distributing phase.
struct GatedTransfer {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl TransferCapability for GatedTransfer {
    async fn transfer(
        &self,
        _to: &str,
        _amount: Amount,
        _asset_type: &AssetType,
        _chain: &[DelegationLink],
    ) -> Result<TransferReceipt, TransferError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(TransferReceipt {
            receipt_id: "receipt-gated".to_string(),
        })
    }
}

fn bps(v: u32) -> AllocationBps {
    AllocationBps::new(v).unwrap()
}

struct Fixture {
    orchestrator: Arc<ExecutionOrchestrator>,
    store: Arc<MemoryRecordStore>,
    #[allow(dead_code)]
    clock: Arc<ManualClock>,
    vault_id: String,
    permission_id: String,
}

fn fixture_with(
    trigger: TriggerCondition,
    balance: Amount,
    table: &[(&str, u32)],
    transfer: Arc<dyn TransferCapability>,
) -> Fixture {
    let store = Arc::new(MemoryRecordStore::new());
    let clock = Arc::new(ManualClock::new(NOW));

    let beneficiaries = table
        .iter()
        .map(|(addr, share)| Beneficiary::new(*addr, bps(*share)))
        .collect();
    let mut vault = Vault::new(
        "vault-1",
        "0xowner",
        AssetType::Native,
        trigger,
        beneficiaries,
        NOW - DAY,
    );
    if balance > 0 {
        vault.deposit(balance).unwrap();
    }
    store.put_vault(&vault).unwrap();

    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        store.clone(),
        clock.clone(),
        Arc::new(StaticSigner),
        transfer,
        TIMEOUT,
    ));
    let permission = orchestrator
        .grant_permission(&vault.id, "0xprimary", AssetType::Native, balance.max(1), 7 * DAY)
        .unwrap();

    Fixture {
        orchestrator,
        store,
        clock,
        vault_id: vault.id,
        permission_id: permission.id,
    }
}

fn released_fixture(balance: Amount, table: &[(&str, u32)]) -> Fixture {
    fixture_with(
        TriggerCondition::Time {
            release_at: NOW - 10,
        },
        balance,
        table,
        Arc::new(ScriptedTransfer::default()),
    )
}

fn request(fixture: &Fixture, amount: Amount) -> ExecutionRequest {
    ExecutionRequest {
        vault_id: fixture.vault_id.clone(),
        permission_id: fixture.permission_id.clone(),
        amount,
        verifier: None,
    }
}

#[tokio::test]
async fn full_execution_commits_ledger_vault_and_history() {
    let fixture = released_fixture(10, &[("0xa", 6_000), ("0xb", 4_000)]);

    let record = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap();

    assert_eq!(record.overall_status, OverallStatus::Success);
    assert_eq!(record.total_distributed, 10);
    assert_eq!(record.requested_amount, 10);
    assert_eq!(record.outcomes.len(), 2);

    let permission = fixture.store.get_permission(&fixture.permission_id).unwrap();
    assert_eq!(permission.remaining_allowance, 0);
    assert_eq!(permission.status, PermissionStatus::Exhausted);
    assert_eq!(permission.usage_count, 1);

    let vault = fixture.store.get_vault(&fixture.vault_id).unwrap();
    assert_eq!(vault.balance, 0);
    assert_eq!(vault.beneficiaries[0].received_amount, 6);
    assert_eq!(vault.beneficiaries[1].received_amount, 4);

    let history = fixture.store.executions_for_vault(&fixture.vault_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], record);
}

#[tokio::test]
async fn dual_control_execution_succeeds() {
    let fixture = released_fixture(10, &[("0xa", 10_000)]);

    let record = fixture
        .orchestrator
        .execute(ExecutionRequest {
            verifier: Some(VerifierDelegation {
                agent_address: "0xverifier".to_string(),
                scope_amount: 5,
            }),
            ..request(&fixture, 10)
        })
        .await
        .unwrap();

    assert_eq!(record.overall_status, OverallStatus::Success);
}

#[tokio::test]
async fn oversized_verifier_scope_aborts_without_mutation() {
    let fixture = released_fixture(10, &[("0xa", 10_000)]);

    let err = fixture
        .orchestrator
        .execute(ExecutionRequest {
            verifier: Some(VerifierDelegation {
                agent_address: "0xverifier".to_string(),
                scope_amount: 12,
            }),
            ..request(&fixture, 10)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Delegation(_)));
    let permission = fixture.store.get_permission(&fixture.permission_id).unwrap();
    assert_eq!(permission.remaining_allowance, 10);
    assert!(fixture
        .store
        .executions_for_vault(&fixture.vault_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unmet_trigger_aborts_with_remaining_time() {
    let fixture = fixture_with(
        TriggerCondition::Time {
            release_at: NOW + 100,
        },
        10,
        &[("0xa", 10_000)],
        Arc::new(ScriptedTransfer::default()),
    );

    let err = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::TriggerNotMet {
            remaining_seconds: Some(100)
        }
    ));
    // Aborted attempts are a no-op on persisted state.
    let permission = fixture.store.get_permission(&fixture.permission_id).unwrap();
    assert_eq!(permission.remaining_allowance, 10);
    assert!(fixture
        .store
        .executions_for_vault(&fixture.vault_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn manual_trigger_gates_until_activated() {
    let fixture = fixture_with(
        TriggerCondition::Manual { activated: false },
        10,
        &[("0xa", 10_000)],
        Arc::new(ScriptedTransfer::default()),
    );

    let err = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::TriggerNotMet {
            remaining_seconds: None
        }
    ));

    fixture
        .orchestrator
        .activate_manual_trigger(&fixture.vault_id)
        .unwrap();

    let record = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap();
    assert_eq!(record.overall_status, OverallStatus::Success);
}

#[tokio::test]
async fn revoked_permission_aborts() {
    let fixture = released_fixture(10, &[("0xa", 10_000)]);
    fixture
        .orchestrator
        .revoke_permission(&fixture.permission_id)
        .unwrap();

    let err = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Permission(PermissionError::RevokedPermission { .. })
    ));
    assert!(fixture
        .store
        .executions_for_vault(&fixture.vault_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn partial_batch_debits_distributed_portion_only() {
    let fixture = fixture_with(
        TriggerCondition::Time {
            release_at: NOW - 10,
        },
        10,
        &[("0xa", 6_000), ("0xb", 4_000)],
        Arc::new(ScriptedTransfer {
            fail_addresses: ["0xb".to_string()].into(),
            sequence: AtomicU64::new(0),
        }),
    );

    let record = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap();

    assert_eq!(record.overall_status, OverallStatus::Partial);
    assert_eq!(record.total_distributed, 6);

    let permission = fixture.store.get_permission(&fixture.permission_id).unwrap();
    assert_eq!(permission.remaining_allowance, 4);
    assert_eq!(permission.status, PermissionStatus::Active);

    let vault = fixture.store.get_vault(&fixture.vault_id).unwrap();
    assert_eq!(vault.balance, 4);
    assert_eq!(vault.beneficiaries[0].received_amount, 6);
    assert_eq!(vault.beneficiaries[1].received_amount, 0);
}

#[tokio::test]
async fn failed_batch_records_history_without_debit() {
    let fixture = fixture_with(
        TriggerCondition::Time {
            release_at: NOW - 10,
        },
        10,
        &[("0xa", 10_000)],
        Arc::new(ScriptedTransfer {
            fail_addresses: ["0xa".to_string()].into(),
            sequence: AtomicU64::new(0),
        }),
    );

    let record = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap();

    assert_eq!(record.overall_status, OverallStatus::Failed);
    assert_eq!(record.total_distributed, 0);

    // Nothing distributed, nothing debited.
    let permission = fixture.store.get_permission(&fixture.permission_id).unwrap();
    assert_eq!(permission.remaining_allowance, 10);
    let vault = fixture.store.get_vault(&fixture.vault_id).unwrap();
    assert_eq!(vault.balance, 10);
    assert_eq!(
        fixture
            .store
            .executions_for_vault(&fixture.vault_id)
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn concurrent_duplicate_is_rejected() {
    let gated = Arc::new(GatedTransfer {
        started: Notify::new(),
        release: Notify::new(),
    });
    let fixture = fixture_with(
        TriggerCondition::Time {
            release_at: NOW - 10,
        },
        10,
        &[("0xa", 10_000)],
        gated.clone(),
    );

    let first = {
        let orchestrator = fixture.orchestrator.clone();
        let req = request(&fixture, 10);
        tokio::spawn(async move { orchestrator.execute(req).await })
    };
    gated.started.notified().await;

    // Same (vault, permission) pair while the first is distributing.
    let err = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::ExecutionInProgress { .. }));

    gated.release.notify_one();
    let record = first.await.unwrap().unwrap();
    assert_eq!(record.overall_status, OverallStatus::Success);

    // The guard is released once the first attempt finishes.
    let err = fixture
        .orchestrator
        .execute(request(&fixture, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Permission(PermissionError::InsufficientAllowance { .. })
    ));
}

#[tokio::test]
async fn permission_from_other_vault_rejected() {
    let fixture = released_fixture(10, &[("0xa", 10_000)]);

    let mut other = Vault::new(
        "vault-2",
        "0xowner",
        AssetType::Native,
        TriggerCondition::Time {
            release_at: NOW - 10,
        },
        vec![Beneficiary::new("0xa", bps(10_000))],
        NOW - DAY,
    );
    other.deposit(10).unwrap();
    fixture.store.put_vault(&other).unwrap();

    let err = fixture
        .orchestrator
        .execute(ExecutionRequest {
            vault_id: "vault-2".to_string(),
            ..request(&fixture, 10)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::PermissionVaultMismatch { .. }));
}

#[tokio::test]
async fn request_beyond_vault_balance_rejected() {
    let fixture = released_fixture(10, &[("0xa", 10_000)]);
    // Widen the allowance past the balance so the vault check is the one
    // that fires.
    let permission = fixture
        .orchestrator
        .grant_permission(&fixture.vault_id, "0xprimary", AssetType::Native, 50, 7 * DAY)
        .unwrap();

    let err = fixture
        .orchestrator
        .execute(ExecutionRequest {
            permission_id: permission.id,
            ..request(&fixture, 20)
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Vault(VaultError::InsufficientBalance {
            requested: 20,
            available: 10,
            ..
        })
    ));
}

#[tokio::test]
async fn inactive_vault_rejected() {
    let fixture = released_fixture(10, &[("0xa", 10_000)]);
    let mut vault = fixture.store.get_vault(&fixture.vault_id).unwrap();
    vault.deactivate();
    fixture.store.put_vault(&vault).unwrap();

    let err = fixture
        .orchestrator
        .execute(request(&fixture, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::VaultInactive { .. }));
}

#[tokio::test]
async fn summary_aggregates_history() {
    let fixture = released_fixture(100, &[("0xa", 6_000), ("0xb", 4_000)]);

    fixture.orchestrator.execute(request(&fixture, 40)).await.unwrap();
    fixture.orchestrator.execute(request(&fixture, 30)).await.unwrap();

    let summary = fixture
        .orchestrator
        .execution_summary(&fixture.vault_id)
        .unwrap();
    assert_eq!(summary.total_executions, 2);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.partial, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total_distributed, 70);
}
