//! Key-value record persistence for engine entities.
//!
//! The engine assumes nothing about persistence technology beyond typed
//! get/put/list operations and per-entity atomic writes; there is no
//! multi-entity transaction. The orchestrator therefore writes in a fixed
//! order (debit ledger, then append the execution record) and documents
//! the crash window between the two.
//!
//! [`MemoryRecordStore`] is the in-process implementation used by the
//! dashboard wiring and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::orchestrator::ExecutionRecord;
use crate::permission::Permission;
use crate::vault::Vault;

/// Errors from record store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// No record with the given identifier.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("vault", "permission", "execution").
        kind: &'static str,
        /// The missing identifier.
        id: String,
    },

    /// An execution record with this identifier already exists. History
    /// is append-only and records are immutable once written.
    #[error("execution record already exists: {id}")]
    DuplicateExecution {
        /// The duplicated identifier.
        id: String,
    },
}

/// Typed key-value persistence for engine entities.
///
/// Implementations must provide atomic per-entity writes. `put` operations
/// overwrite for vaults and permissions; execution history is append-only.
pub trait RecordStore: Send + Sync {
    /// Fetches a vault by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    fn get_vault(&self, id: &str) -> Result<Vault, StoreError>;

    /// Writes a vault, replacing any prior version.
    ///
    /// # Errors
    ///
    /// Returns a store error on persistence failure.
    fn put_vault(&self, vault: &Vault) -> Result<(), StoreError>;

    /// Fetches a permission by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    fn get_permission(&self, id: &str) -> Result<Permission, StoreError>;

    /// Writes a permission, replacing any prior version.
    ///
    /// # Errors
    ///
    /// Returns a store error on persistence failure.
    fn put_permission(&self, permission: &Permission) -> Result<(), StoreError>;

    /// Lists permissions granted against a vault.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn permissions_for_vault(&self, vault_id: &str) -> Result<Vec<Permission>, StoreError>;

    /// Appends an immutable execution record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateExecution`] if the id was already
    /// recorded.
    fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Lists a vault's execution history in append order.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure.
    fn executions_for_vault(&self, vault_id: &str) -> Result<Vec<ExecutionRecord>, StoreError>;
}

#[derive(Default)]
struct Records {
    vaults: HashMap<String, Vault>,
    permissions: HashMap<String, Permission>,
    executions: Vec<ExecutionRecord>,
}

/// In-memory record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Records>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Records> {
        // Entity values are replaced wholesale, so a poisoned lock cannot
        // expose a half-written record; recover the guard.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryRecordStore {
    fn get_vault(&self, id: &str) -> Result<Vault, StoreError> {
        self.records()
            .vaults
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "vault",
                id: id.to_string(),
            })
    }

    fn put_vault(&self, vault: &Vault) -> Result<(), StoreError> {
        self.records()
            .vaults
            .insert(vault.id.clone(), vault.clone());
        Ok(())
    }

    fn get_permission(&self, id: &str) -> Result<Permission, StoreError> {
        self.records()
            .permissions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "permission",
                id: id.to_string(),
            })
    }

    fn put_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        self.records()
            .permissions
            .insert(permission.id.clone(), permission.clone());
        Ok(())
    }

    fn permissions_for_vault(&self, vault_id: &str) -> Result<Vec<Permission>, StoreError> {
        let mut permissions: Vec<Permission> = self
            .records()
            .permissions
            .values()
            .filter(|p| p.vault_id == vault_id)
            .cloned()
            .collect();
        permissions.sort_by_key(|p| (p.granted_at, p.id.clone()));
        Ok(permissions)
    }

    fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut records = self.records();
        if records.executions.iter().any(|r| r.id == record.id) {
            return Err(StoreError::DuplicateExecution {
                id: record.id.clone(),
            });
        }
        records.executions.push(record.clone());
        Ok(())
    }

    fn executions_for_vault(&self, vault_id: &str) -> Result<Vec<ExecutionRecord>, StoreError> {
        Ok(self
            .records()
            .executions
            .iter()
            .filter(|r| r.vault_id == vault_id)
            .cloned()
            .collect())
    }
}

impl std::fmt::Debug for MemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRecordStore").finish_non_exhaustive()
    }
}
