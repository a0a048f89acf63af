//! Unit and property tests for the permission state machine and ledger.
//!
//! Properties covered:
//! - Allowance monotonicity: `remaining_allowance` never increases and
//!   never goes negative across any debit sequence.
//! - No partial debit: a failed debit leaves the permission identical.
//! - Revocation terminality: a revoked permission never checks usable
//!   again, regardless of time or remaining allowance.

#![allow(clippy::items_after_statements)]

use std::sync::Arc;

use proptest::prelude::*;

use crate::clock::ManualClock;
use crate::store::{MemoryRecordStore, RecordStore};
use crate::vault::AssetType;

use super::{Permission, PermissionError, PermissionLedger, PermissionStatus};

const NOW: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

fn granted(max_amount: u128) -> Permission {
    Permission::grant("vault-1", "0xagent", AssetType::Native, max_amount, DAY, NOW).unwrap()
}

#[test]
fn grant_initializes_full_allowance() {
    let permission = granted(10);
    assert_eq!(permission.remaining_allowance, 10);
    assert_eq!(permission.max_amount, 10);
    assert_eq!(permission.status, PermissionStatus::Active);
    assert_eq!(permission.expires_at, NOW + DAY);
    assert_eq!(permission.usage_count, 0);
}

#[test]
fn grant_rejects_zero_ceiling() {
    let err = Permission::grant("vault-1", "0xagent", AssetType::Native, 0, DAY, NOW).unwrap_err();
    assert!(matches!(err, PermissionError::InvalidAmount { amount: 0 }));
}

#[test]
fn full_debit_exhausts_then_rejects() {
    let mut permission = granted(10);

    permission.debit(10, NOW).unwrap();
    assert_eq!(permission.remaining_allowance, 0);
    assert_eq!(permission.status, PermissionStatus::Exhausted);
    assert_eq!(permission.usage_count, 1);

    let err = permission.debit(1, NOW).unwrap_err();
    assert!(matches!(
        err,
        PermissionError::InsufficientAllowance {
            requested: 1,
            remaining: 0,
            ..
        }
    ));
}

#[test]
fn failed_debit_leaves_permission_unchanged() {
    let mut permission = granted(10);
    permission.debit(3, NOW).unwrap();

    let before = permission.clone();
    let err = permission.debit(8, NOW).unwrap_err();
    assert!(matches!(err, PermissionError::InsufficientAllowance { .. }));
    assert_eq!(permission, before);
}

#[test]
fn expiry_is_rederived_from_time() {
    let permission = granted(10);

    permission.check_usable(NOW + DAY - 1, 1).unwrap();

    let err = permission.check_usable(NOW + DAY, 1).unwrap_err();
    assert!(matches!(
        err,
        PermissionError::PermissionExpired {
            expires_at,
            ..
        } if expires_at == NOW + DAY
    ));
}

#[test]
fn revocation_is_terminal_and_overrides_everything() {
    let mut permission = granted(10);
    permission.debit(5, NOW).unwrap();

    permission.revoke(NOW + 10);
    assert_eq!(permission.status, PermissionStatus::Revoked);
    assert_eq!(permission.revoked_at, Some(NOW + 10));
    assert_eq!(permission.remaining_allowance, 5);

    // Revoked wins over the in-range allowance and over expiry.
    for now in [NOW, NOW + DAY, NOW + 10 * DAY] {
        let err = permission.check_usable(now, 1).unwrap_err();
        assert!(matches!(err, PermissionError::RevokedPermission { .. }));
    }

    // Revoking again stays revoked at the original semantics.
    permission.revoke(NOW + 20);
    assert_eq!(permission.status, PermissionStatus::Revoked);
}

#[test]
fn zero_debit_rejected() {
    let permission = granted(10);
    let err = permission.check_usable(NOW, 0).unwrap_err();
    assert!(matches!(err, PermissionError::InvalidAmount { amount: 0 }));
}

#[test]
fn refresh_status_flips_active_to_expired_once() {
    let mut permission = granted(10);
    assert!(!permission.refresh_status(NOW));
    assert!(permission.refresh_status(NOW + DAY));
    assert_eq!(permission.status, PermissionStatus::Expired);
    assert!(!permission.refresh_status(NOW + 2 * DAY));

    // Expired never reverts, even when checked before the boundary.
    let err = permission.check_usable(NOW, 1).unwrap_err();
    assert!(matches!(err, PermissionError::PermissionExpired { .. }));
}

#[test]
fn time_remaining_saturates() {
    let permission = granted(10);
    assert_eq!(permission.time_remaining(NOW), DAY);
    assert_eq!(permission.time_remaining(NOW + 2 * DAY), 0);
}

// ============================================================================
// Ledger (persistence) tests
// ============================================================================

fn ledger_fixture() -> (PermissionLedger, Arc<MemoryRecordStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryRecordStore::new());
    let clock = Arc::new(ManualClock::new(NOW));
    let ledger = PermissionLedger::new(store.clone(), clock.clone());
    (ledger, store, clock)
}

#[test]
fn ledger_grant_persists() {
    let (ledger, store, _clock) = ledger_fixture();
    let permission = ledger
        .grant("vault-1", "0xagent", AssetType::Native, 10, DAY)
        .unwrap();

    let stored = store.get_permission(&permission.id).unwrap();
    assert_eq!(stored, permission);
}

#[test]
fn ledger_debit_persists_and_failed_debit_does_not() {
    let (ledger, store, _clock) = ledger_fixture();
    let permission = ledger
        .grant("vault-1", "0xagent", AssetType::Native, 10, DAY)
        .unwrap();

    ledger.debit(&permission.id, 4).unwrap();
    assert_eq!(
        store.get_permission(&permission.id).unwrap().remaining_allowance,
        6
    );

    let err = ledger.debit(&permission.id, 7).unwrap_err();
    assert!(matches!(err, PermissionError::InsufficientAllowance { .. }));
    assert_eq!(
        store.get_permission(&permission.id).unwrap().remaining_allowance,
        6
    );
}

#[test]
fn ledger_check_records_observed_expiry() {
    let (ledger, store, clock) = ledger_fixture();
    let permission = ledger
        .grant("vault-1", "0xagent", AssetType::Native, 10, DAY)
        .unwrap();

    clock.advance(DAY + 1);
    let err = ledger.check_usable(&permission.id, 1).unwrap_err();
    assert!(matches!(err, PermissionError::PermissionExpired { .. }));

    assert_eq!(
        store.get_permission(&permission.id).unwrap().status,
        PermissionStatus::Expired
    );
}

#[test]
fn ledger_revoke_persists_terminal_state() {
    let (ledger, store, _clock) = ledger_fixture();
    let permission = ledger
        .grant("vault-1", "0xagent", AssetType::Native, 5, DAY)
        .unwrap();

    ledger.revoke(&permission.id).unwrap();

    let stored = store.get_permission(&permission.id).unwrap();
    assert_eq!(stored.status, PermissionStatus::Revoked);
    assert_eq!(stored.remaining_allowance, 5);

    let err = ledger.check_usable(&permission.id, 1).unwrap_err();
    assert!(matches!(err, PermissionError::RevokedPermission { .. }));
}

#[test]
fn ledger_lists_permissions_by_vault() {
    let (ledger, _store, _clock) = ledger_fixture();
    ledger
        .grant("vault-1", "0xagent-a", AssetType::Native, 5, DAY)
        .unwrap();
    ledger
        .grant("vault-1", "0xagent-b", AssetType::Native, 7, DAY)
        .unwrap();
    ledger
        .grant("vault-2", "0xagent-a", AssetType::Native, 9, DAY)
        .unwrap();

    assert_eq!(ledger.permissions_for_vault("vault-1").unwrap().len(), 2);
    assert_eq!(ledger.permissions_for_vault("vault-2").unwrap().len(), 1);
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// Allowance monotonicity: across any sequence of debit attempts,
    /// `remaining_allowance` is non-increasing and never exceeds
    /// `max_amount`; `usage_count` grows only on success.
    #[test]
    fn prop_allowance_monotonic(
        max_amount in 1u128..10_000,
        amounts in prop::collection::vec(0u128..2_000, 0..32),
    ) {
        let mut permission = granted(max_amount);
        let mut previous = permission.remaining_allowance;

        for amount in amounts {
            let _ = permission.debit(amount, NOW);
            prop_assert!(permission.remaining_allowance <= previous);
            prop_assert!(permission.remaining_allowance <= permission.max_amount);
            previous = permission.remaining_allowance;
        }
    }

    /// No partial debit: an over-allowance debit is a no-op on the whole
    /// permission value.
    #[test]
    fn prop_failed_debit_is_noop(
        max_amount in 1u128..1_000,
        excess in 1u128..1_000,
    ) {
        let mut permission = granted(max_amount);
        let before = permission.clone();
        prop_assert!(permission.debit(max_amount + excess, NOW).is_err());
        prop_assert_eq!(permission, before);
    }

    /// Revocation terminality: after revoke, no check at any time with
    /// any amount passes.
    #[test]
    fn prop_revocation_terminal(
        max_amount in 1u128..1_000,
        now_offset in 0u64..(10 * DAY),
        requested in 1u128..1_000,
    ) {
        let mut permission = granted(max_amount);
        permission.revoke(NOW);
        prop_assert!(matches!(
            permission.check_usable(NOW + now_offset, requested),
            Err(PermissionError::RevokedPermission { .. })
        ), "expected RevokedPermission error");
    }
}
