//! Vault and beneficiary entities.
//!
//! A vault is created once by its owner, holds a non-negative balance of a
//! single asset, and is never deleted, only marked inactive. Its balance
//! is mutated only by deposits, withdrawals, and distribution commits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{allocations_balanced, AllocationBps, Amount};
use crate::trigger::TriggerCondition;

/// Errors from vault balance operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VaultError {
    /// A withdrawal or distribution exceeds the vault balance.
    #[error("vault {vault_id}: requested {requested} exceeds balance {available}")]
    InsufficientBalance {
        /// The vault identifier.
        vault_id: String,
        /// The amount requested.
        requested: Amount,
        /// The balance available.
        available: Amount,
    },

    /// A zero-amount deposit or withdrawal.
    #[error("vault {vault_id}: amount must be positive")]
    InvalidAmount {
        /// The vault identifier.
        vault_id: String,
    },
}

/// The asset a vault is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetType {
    /// The chain's native token.
    Native,
    /// A fungible token identified by its contract address.
    FungibleToken {
        /// The token contract address.
        token_address: String,
    },
}

/// A beneficiary entitled to a share of a vault's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Beneficiary {
    /// Recipient account address.
    pub address: String,
    /// Share of the vault balance on distribution.
    pub allocation: AllocationBps,
    /// Cumulative amount received across all executions. Monotonically
    /// non-decreasing.
    pub received_amount: Amount,
}

impl Beneficiary {
    /// Creates a beneficiary with nothing received yet.
    #[must_use]
    pub fn new(address: impl Into<String>, allocation: AllocationBps) -> Self {
        Self {
            address: address.into(),
            allocation,
            received_amount: 0,
        }
    }

    /// Records a successful transfer to this beneficiary.
    pub fn record_receipt(&mut self, amount: Amount) {
        self.received_amount = self.received_amount.saturating_add(amount);
    }
}

/// An owner-controlled balance subject to inheritance rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vault {
    /// Unique vault identifier.
    pub id: String,
    /// Owner account address.
    pub owner: String,
    /// Current balance in base units.
    pub balance: Amount,
    /// Asset the balance is denominated in.
    pub asset_type: AssetType,
    /// Release condition gating execution.
    pub trigger: TriggerCondition,
    /// Ordered beneficiary allocation table.
    pub beneficiaries: Vec<Beneficiary>,
    /// Creation time in seconds since the UNIX epoch.
    pub created_at: u64,
    /// Vaults are never deleted, only deactivated.
    pub active: bool,
}

impl Vault {
    /// Creates an active vault with a zero starting balance.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        asset_type: AssetType,
        trigger: TriggerCondition,
        beneficiaries: Vec<Beneficiary>,
        created_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            balance: 0,
            asset_type,
            trigger,
            beneficiaries,
            created_at,
            active: true,
        }
    }

    /// Sum of the beneficiary allocation table, in hundredths of a percent.
    #[must_use]
    pub fn allocation_sum_bps(&self) -> u64 {
        self.beneficiaries
            .iter()
            .map(|b| u64::from(b.allocation.as_bps()))
            .sum()
    }

    /// Returns true if the allocation table sums to 100% within tolerance.
    #[must_use]
    pub fn allocations_balanced(&self) -> bool {
        allocations_balanced(self.allocation_sum_bps())
    }

    /// Credits the vault balance.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidAmount`] for a zero deposit.
    pub fn deposit(&mut self, amount: Amount) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount {
                vault_id: self.id.clone(),
            });
        }
        self.balance = self.balance.saturating_add(amount);
        Ok(())
    }

    /// Debits the vault balance. The balance never goes negative.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidAmount`] for a zero withdrawal and
    /// [`VaultError::InsufficientBalance`] when `amount` exceeds the
    /// balance.
    pub fn withdraw(&mut self, amount: Amount) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount {
                vault_id: self.id.clone(),
            });
        }
        if amount > self.balance {
            return Err(VaultError::InsufficientBalance {
                vault_id: self.id.clone(),
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Marks the vault inactive. Irreversible by design; there is no
    /// reactivation path.
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
