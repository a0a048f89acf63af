//! Persisted allowance accounting over a [`RecordStore`].
//!
//! The ledger loads a permission, applies one of the value-level
//! transitions on [`Permission`], and writes the result back. A read-only
//! check that observes expiry persists the `Expired` flip so later reads
//! agree with what was observed.

use std::sync::Arc;

use tracing::{debug, info};

use crate::amount::Amount;
use crate::clock::Clock;
use crate::store::RecordStore;
use crate::vault::AssetType;

use super::{Permission, PermissionError};

/// Allowance accounting engine backed by a record store.
#[derive(Clone)]
pub struct PermissionLedger {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl PermissionLedger {
    /// Creates a ledger over the given store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Grants a new permission and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::InvalidAmount`] for a zero ceiling, or
    /// a store error from persistence.
    pub fn grant(
        &self,
        vault_id: &str,
        agent_address: &str,
        asset_type: AssetType,
        max_amount: Amount,
        duration_secs: u64,
    ) -> Result<Permission, PermissionError> {
        let now = self.clock.now_secs();
        let permission = Permission::grant(
            vault_id,
            agent_address,
            asset_type,
            max_amount,
            duration_secs,
            now,
        )?;
        self.store.put_permission(&permission)?;
        info!(
            permission_id = %permission.id,
            vault_id,
            agent_address,
            max_amount,
            expires_at = permission.expires_at,
            "permission granted"
        );
        Ok(permission)
    }

    /// Checks whether `requested` could be debited right now, returning
    /// the freshly loaded permission on success.
    ///
    /// Expiry observed during the check is persisted, so the stored
    /// status catches up with wall-clock reality.
    ///
    /// # Errors
    ///
    /// Returns the first failing admissibility check or a store error.
    pub fn check_usable(
        &self,
        permission_id: &str,
        requested: Amount,
    ) -> Result<Permission, PermissionError> {
        let now = self.clock.now_secs();
        let mut permission = self.store.get_permission(permission_id)?;
        if permission.refresh_status(now) {
            self.store.put_permission(&permission)?;
            debug!(permission_id, "permission expiry observed and recorded");
        }
        permission.check_usable(now, requested)?;
        Ok(permission)
    }

    /// Debits `amount` from the permission's allowance and persists the
    /// result. A failed debit leaves the stored permission untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`PermissionError`] from the debit precondition or a
    /// store error.
    pub fn debit(&self, permission_id: &str, amount: Amount) -> Result<Permission, PermissionError> {
        let now = self.clock.now_secs();
        let mut permission = self.store.get_permission(permission_id)?;
        permission.debit(amount, now)?;
        self.store.put_permission(&permission)?;
        debug!(
            permission_id,
            amount,
            remaining = permission.remaining_allowance,
            status = %permission.status,
            "allowance debited"
        );
        Ok(permission)
    }

    /// Revokes the permission unconditionally and persists the result.
    ///
    /// # Errors
    ///
    /// Returns a store error if the permission cannot be loaded or saved.
    pub fn revoke(&self, permission_id: &str) -> Result<Permission, PermissionError> {
        let now = self.clock.now_secs();
        let mut permission = self.store.get_permission(permission_id)?;
        permission.revoke(now);
        self.store.put_permission(&permission)?;
        info!(permission_id, revoked_at = now, "permission revoked");
        Ok(permission)
    }

    /// Lists the permissions granted against a vault.
    ///
    /// # Errors
    ///
    /// Returns a store error from the listing.
    pub fn permissions_for_vault(&self, vault_id: &str) -> Result<Vec<Permission>, PermissionError> {
        Ok(self.store.permissions_for_vault(vault_id)?)
    }
}

impl std::fmt::Debug for PermissionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionLedger").finish_non_exhaustive()
    }
}
