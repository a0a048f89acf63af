//! Permission-specific error types.

use thiserror::Error;

use crate::amount::Amount;
use crate::store::StoreError;

/// Errors that can occur during permission operations.
///
/// Every error carries the identifiers and amounts needed to render a
/// precise user-facing message; none are silently discarded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PermissionError {
    /// The permission was revoked by the owner. Revocation is terminal
    /// and takes precedence over every other check.
    #[error("permission {permission_id} was revoked by owner at {revoked_at:?}")]
    RevokedPermission {
        /// The revoked permission.
        permission_id: String,
        /// When the revocation happened, if recorded.
        revoked_at: Option<u64>,
    },

    /// The permission's expiry time has passed.
    #[error("permission {permission_id} expired at {expires_at} (now {now})")]
    PermissionExpired {
        /// The expired permission.
        permission_id: String,
        /// The configured expiry time.
        expires_at: u64,
        /// The observation time.
        now: u64,
    },

    /// The requested amount exceeds the remaining allowance.
    #[error(
        "permission {permission_id}: requested {requested} exceeds remaining allowance {remaining}"
    )]
    InsufficientAllowance {
        /// The permission being debited.
        permission_id: String,
        /// The amount requested.
        requested: Amount,
        /// The allowance still available.
        remaining: Amount,
    },

    /// A grant or debit with a non-positive amount.
    #[error("amount must be positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: Amount,
    },

    /// Persistence failure while reading or writing a permission.
    #[error(transparent)]
    Store(#[from] StoreError),
}
