//! Agent-to-agent re-delegation chains.
//!
//! A delegation chain is an ordered list of links rooted at the vault
//! owner's granted permission: owner -> primary executor agent, optionally
//! extended by a primary -> verifier re-delegation for dual-control
//! execution. Each link's scope is bounded by its parent's, so authority
//! only narrows along the chain.
//!
//! Links are immutable once signed; building a child never mutates
//! existing links. Signing itself is performed by an injected
//! [`SigningCapability`] (the signing wallet); the builder only validates
//! and attaches the produced signature.


use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::amount::Amount;
use crate::permission::Permission;

/// Maximum depth of a delegation chain.
pub const MAX_DELEGATION_DEPTH: u32 = 16;

/// Maximum number of links in a chain (root plus re-delegations).
pub const MAX_CHAIN_LINKS: usize = MAX_DELEGATION_DEPTH as usize + 1;

/// A signer declined or failed to produce a signature.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("signer rejected payload: {reason}")]
pub struct SigningRejected {
    /// Why the signer declined.
    pub reason: String,
}

/// Errors from chain construction and validation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DelegationError {
    /// A structural violation in the chain, identifying the offending
    /// link.
    #[error("invalid delegation chain at link {index}: {reason}")]
    InvalidDelegationChain {
        /// Index of the offending link.
        index: usize,
        /// What the link violated.
        reason: String,
    },

    /// The external signing capability failed.
    #[error(transparent)]
    SigningFailed(#[from] SigningRejected),

    /// The signing payload could not be encoded.
    #[error("failed to encode signing payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// External signing capability (the signing wallet).
///
/// The engine never holds key material; it hands the canonical link
/// payload to the capability and attaches whatever signature comes back.
pub trait SigningCapability: Send + Sync {
    /// Signs the payload, returning the raw signature bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SigningRejected`] if the signer declines.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningRejected>;
}

/// One edge in a re-delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegationLink {
    /// Unique link identifier.
    pub id: String,
    /// Delegating account.
    pub from: String,
    /// Receiving agent account.
    pub to: String,
    /// Spending scope delegated to `to`. Bounded by the parent's scope
    /// (or the root permission's remaining allowance).
    pub scope_amount: Amount,
    /// Parent link, `None` for the root link.
    pub parent_link_id: Option<String>,
    /// Position in the chain, 0 for the root link.
    pub depth: u32,
    /// Signature from `from` over the canonical link payload.
    pub signature: Vec<u8>,
}

/// The canonical payload a delegator signs: the link without its
/// signature. Field order is fixed by this definition.
#[derive(Serialize)]
struct SigningPayload<'a> {
    id: &'a str,
    from: &'a str,
    to: &'a str,
    scope_amount: Amount,
    parent_link_id: Option<&'a str>,
    depth: u32,
}

impl DelegationLink {
    fn signed(
        from: String,
        to: String,
        scope_amount: Amount,
        parent_link_id: Option<String>,
        depth: u32,
        signer: &dyn SigningCapability,
    ) -> Result<Self, DelegationError> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_vec(&SigningPayload {
            id: &id,
            from: &from,
            to: &to,
            scope_amount,
            parent_link_id: parent_link_id.as_deref(),
            depth,
        })?;
        let signature = signer.sign(&payload)?;
        Ok(Self {
            id,
            from,
            to,
            scope_amount,
            parent_link_id,
            depth,
            signature,
        })
    }
}

/// Builds the root link of a chain: vault owner -> primary agent, drawing
/// on the owner's granted permission.
///
/// # Errors
///
/// Returns [`DelegationError::InvalidDelegationChain`] if `scope_amount`
/// exceeds the permission's remaining allowance, or a signing error.
pub fn build_root_link(
    owner: &str,
    permission: &Permission,
    scope_amount: Amount,
    signer: &dyn SigningCapability,
) -> Result<DelegationLink, DelegationError> {
    if scope_amount > permission.remaining_allowance {
        return Err(DelegationError::InvalidDelegationChain {
            index: 0,
            reason: format!(
                "scope {scope_amount} exceeds permission {} remaining allowance {}",
                permission.id, permission.remaining_allowance
            ),
        });
    }
    DelegationLink::signed(
        owner.to_string(),
        permission.agent_address.clone(),
        scope_amount,
        None,
        0,
        signer,
    )
}

/// Builds a child link re-delegating part of `parent`'s scope to another
/// agent. The new link's `from` is the parent's `to` by construction.
///
/// # Errors
///
/// Returns [`DelegationError::InvalidDelegationChain`] if the scope
/// exceeds the parent's or the chain would exceed
/// [`MAX_DELEGATION_DEPTH`], or a signing error.
pub fn build_child_link(
    parent: &DelegationLink,
    to_agent: &str,
    scope_amount: Amount,
    signer: &dyn SigningCapability,
) -> Result<DelegationLink, DelegationError> {
    let index = parent.depth as usize + 1;
    if scope_amount > parent.scope_amount {
        return Err(DelegationError::InvalidDelegationChain {
            index,
            reason: format!(
                "scope {scope_amount} exceeds parent link scope {}",
                parent.scope_amount
            ),
        });
    }
    if parent.depth >= MAX_DELEGATION_DEPTH {
        return Err(DelegationError::InvalidDelegationChain {
            index,
            reason: format!("chain depth exceeds maximum {MAX_DELEGATION_DEPTH}"),
        });
    }
    DelegationLink::signed(
        parent.to.clone(),
        to_agent.to_string(),
        scope_amount,
        Some(parent.id.clone()),
        parent.depth + 1,
        signer,
    )
}

/// Validates a chain's structure: contiguous `from`/`to` endpoints,
/// non-increasing scopes, parent linkage, depth sequence, and a non-empty
/// signature on every link.
///
/// # Errors
///
/// Returns [`DelegationError::InvalidDelegationChain`] identifying the
/// first offending link.
pub fn validate_chain(links: &[DelegationLink]) -> Result<(), DelegationError> {
    let invalid = |index: usize, reason: String| DelegationError::InvalidDelegationChain {
        index,
        reason,
    };

    if links.is_empty() {
        return Err(invalid(0, "chain is empty".to_string()));
    }
    if links.len() > MAX_CHAIN_LINKS {
        return Err(invalid(
            links.len() - 1,
            format!("chain length {} exceeds maximum {MAX_CHAIN_LINKS}", links.len()),
        ));
    }

    for (i, link) in links.iter().enumerate() {
        if link.depth as usize != i {
            return Err(invalid(
                i,
                format!("depth must match position (expected {i}, found {})", link.depth),
            ));
        }
        if link.signature.is_empty() {
            return Err(invalid(i, "link is unsigned".to_string()));
        }
        if i == 0 {
            if link.parent_link_id.is_some() {
                return Err(invalid(i, "root link must not have a parent".to_string()));
            }
            continue;
        }

        let parent = &links[i - 1];
        if link.from != parent.to {
            return Err(invalid(
                i,
                format!(
                    "link from {} does not match previous link to {}",
                    link.from, parent.to
                ),
            ));
        }
        if link.scope_amount > parent.scope_amount {
            return Err(invalid(
                i,
                format!(
                    "scope {} exceeds parent scope {}",
                    link.scope_amount, parent.scope_amount
                ),
            ));
        }
        if link.parent_link_id.as_deref() != Some(parent.id.as_str()) {
            return Err(invalid(i, "parent link id does not match previous link".to_string()));
        }
    }

    Ok(())
}
