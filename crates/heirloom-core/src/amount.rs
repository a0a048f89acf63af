//! Fixed-point amount and allocation arithmetic.
//!
//! All value paths use integer arithmetic in base units; floating point
//! appears only at the UI conversion boundary. Allocation shares are
//! expressed in hundredths of a percent (basis points), so the "sum to
//! 100% within 0.01" tolerance becomes an integer bound.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An asset amount in base units (e.g. wei for the native token).
pub type Amount = u128;

/// Full allocation: 100% expressed in hundredths of a percent.
pub const BPS_SCALE: u64 = 10_000;

/// Tolerance on an allocation table's sum, in hundredths of a percent.
/// Matches the ±0.01 tolerance on the 0-100 percent scale.
pub const ALLOCATION_SUM_TOLERANCE_BPS: u64 = 1;

/// Errors from allocation construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AmountError {
    /// The allocation share is outside the 0-100% range.
    #[error("allocation of {bps} hundredths of a percent exceeds 100%")]
    AllocationOutOfRange {
        /// The rejected value in hundredths of a percent.
        bps: u64,
    },
}

/// A beneficiary's allocation share in hundredths of a percent.
///
/// `AllocationBps(10_000)` is 100%; `AllocationBps(1)` is 0.01%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationBps(u32);

impl AllocationBps {
    /// Creates an allocation share from hundredths of a percent.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::AllocationOutOfRange`] if `bps` exceeds
    /// [`BPS_SCALE`].
    pub fn new(bps: u32) -> Result<Self, AmountError> {
        if u64::from(bps) > BPS_SCALE {
            return Err(AmountError::AllocationOutOfRange {
                bps: u64::from(bps),
            });
        }
        Ok(Self(bps))
    }

    /// Creates an allocation share from a percentage (UI input path).
    ///
    /// The fractional part is rounded to the nearest 0.01%.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::AllocationOutOfRange`] for negative,
    /// non-finite, or >100 inputs.
    pub fn from_percent(percent: f64) -> Result<Self, AmountError> {
        if !percent.is_finite() || percent < 0.0 || percent > 100.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            return Err(AmountError::AllocationOutOfRange {
                bps: if percent.is_finite() && percent > 0.0 {
                    (percent * 100.0) as u64
                } else {
                    u64::MAX
                },
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bps = (percent * 100.0).round() as u32;
        Self::new(bps)
    }

    /// Returns the share in hundredths of a percent.
    #[must_use]
    pub const fn as_bps(self) -> u32 {
        self.0
    }

    /// Computes this share of `total`, flooring toward zero.
    ///
    /// Rounding may only lose value, never create it:
    /// `share_of(t) <= t` for any share within 100%.
    #[must_use]
    pub const fn share_of(self, total: Amount) -> Amount {
        total * self.0 as Amount / BPS_SCALE as Amount
    }
}

/// Returns true if an allocation table's sum is 100% within tolerance.
#[must_use]
pub fn allocations_balanced(sum_bps: u64) -> bool {
    sum_bps.abs_diff(BPS_SCALE) <= ALLOCATION_SUM_TOLERANCE_BPS
}
