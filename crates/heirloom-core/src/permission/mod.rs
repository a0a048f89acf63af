//! Scoped, time-boxed spending permissions and their allowance ledger.
//!
//! A [`Permission`] grants an agent address the right to spend up to
//! `max_amount` of a vault's assets before `expires_at`. The remaining
//! allowance is the engine's sole piece of mutable shared state, so its
//! mutation surface is deliberately narrow:
//!
//! - [`Permission::debit`] is the only path that decrements
//!   `remaining_allowance`, and it either applies fully or not at all.
//! - Expiry is re-derived from wall-clock time on every check rather than
//!   cached, because it is a function of time, not an event.
//! - Once a permission leaves [`PermissionStatus::Active`] it never
//!   returns; revocation overrides every other computed status.
//!
//! The [`PermissionLedger`] wraps these value-level transitions with
//! persistence through a [`crate::store::RecordStore`].

mod error;
mod ledger;

#[cfg(test)]
mod tests;

pub use error::PermissionError;
pub use ledger::PermissionLedger;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::vault::AssetType;

/// The lifecycle state of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The permission can authorize debits.
    Active,
    /// Terminally disabled by explicit owner action.
    Revoked,
    /// The expiry time passed while the permission was active.
    Expired,
    /// The allowance was fully spent.
    Exhausted,
}

impl PermissionStatus {
    /// Returns the string representation of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
        }
    }

    /// Returns true for states a permission can never leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scoped, revocable spending allowance granted to an agent address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Permission {
    /// Unique permission identifier.
    pub id: String,
    /// The vault this permission draws from.
    pub vault_id: String,
    /// The agent authorized to spend.
    pub agent_address: String,
    /// Asset the allowance is denominated in.
    pub asset_type: AssetType,
    /// Granted ceiling. Immutable after grant.
    pub max_amount: Amount,
    /// Allowance still available. `0 <= remaining_allowance <= max_amount`.
    pub remaining_allowance: Amount,
    /// Grant time in seconds since the UNIX epoch.
    pub granted_at: u64,
    /// Expiry time in seconds since the UNIX epoch.
    pub expires_at: u64,
    /// Current lifecycle status.
    pub status: PermissionStatus,
    /// Number of successful debits.
    pub usage_count: u64,
    /// When the permission was revoked, if it was.
    pub revoked_at: Option<u64>,
}

impl Permission {
    /// Creates a new active permission with the full allowance available.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::InvalidAmount`] if `max_amount` is zero.
    pub fn grant(
        vault_id: impl Into<String>,
        agent_address: impl Into<String>,
        asset_type: AssetType,
        max_amount: Amount,
        duration_secs: u64,
        now: u64,
    ) -> Result<Self, PermissionError> {
        if max_amount == 0 {
            return Err(PermissionError::InvalidAmount { amount: max_amount });
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            vault_id: vault_id.into(),
            agent_address: agent_address.into(),
            asset_type,
            max_amount,
            remaining_allowance: max_amount,
            granted_at: now,
            expires_at: now.saturating_add(duration_secs),
            status: PermissionStatus::Active,
            usage_count: 0,
            revoked_at: None,
        })
    }

    /// Checks whether a debit of `requested` would be admissible at `now`.
    ///
    /// Check order is fixed: revocation first (terminal, overrides
    /// everything), then time-derived expiry, then allowance. Must be
    /// called immediately before every debit; [`Permission::debit`]
    /// re-runs it as its precondition.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`PermissionError`].
    pub fn check_usable(&self, now: u64, requested: Amount) -> Result<(), PermissionError> {
        if self.status == PermissionStatus::Revoked {
            return Err(PermissionError::RevokedPermission {
                permission_id: self.id.clone(),
                revoked_at: self.revoked_at,
            });
        }
        if self.status == PermissionStatus::Expired || now >= self.expires_at {
            return Err(PermissionError::PermissionExpired {
                permission_id: self.id.clone(),
                expires_at: self.expires_at,
                now,
            });
        }
        if requested == 0 {
            return Err(PermissionError::InvalidAmount { amount: requested });
        }
        if requested > self.remaining_allowance {
            return Err(PermissionError::InsufficientAllowance {
                permission_id: self.id.clone(),
                requested,
                remaining: self.remaining_allowance,
            });
        }
        Ok(())
    }

    /// Debits the allowance. Applies fully or not at all: a failed
    /// precondition leaves the permission byte-for-byte unchanged.
    ///
    /// This is the only mutation path for `remaining_allowance`.
    ///
    /// # Errors
    ///
    /// Returns the [`PermissionError`] from the precondition check.
    pub fn debit(&mut self, amount: Amount, now: u64) -> Result<(), PermissionError> {
        self.check_usable(now, amount)?;
        self.remaining_allowance -= amount;
        self.usage_count += 1;
        if self.remaining_allowance == 0 {
            self.status = PermissionStatus::Exhausted;
        }
        Ok(())
    }

    /// Revokes the permission. Always succeeds, is terminal, and takes
    /// precedence over any other computed status.
    pub fn revoke(&mut self, now: u64) {
        self.status = PermissionStatus::Revoked;
        self.revoked_at = Some(now);
    }

    /// Flips an active permission to `Expired` once its expiry time has
    /// been observed. Returns true if the status changed.
    pub fn refresh_status(&mut self, now: u64) -> bool {
        if self.status == PermissionStatus::Active && now >= self.expires_at {
            self.status = PermissionStatus::Expired;
            return true;
        }
        false
    }

    /// Seconds until expiry, or 0 if already expired.
    #[must_use]
    pub const fn time_remaining(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}
