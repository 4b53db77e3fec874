//! Capability Checker
//!
//! Gates every mutating operation behind an explicit allow/deny decision.
//! Token rights are an explicit grant set seeded with the owner at creation
//! time; the owner is a default grant, not an unconditional override, so
//! revoking the owner's own grant is respected. Domains have no delegation
//! model: only the owner may mutate a domain.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::naming::Domain;
use crate::token::Token;

/// A named right over a token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Mint,
    Burn,
    Transfer,
    UpdateMetadata,
    UpdatePermissions,
}

impl Capability {
    /// All capabilities, used to seed the owner's grants at token creation.
    pub const ALL: [Capability; 5] = [
        Capability::Mint,
        Capability::Burn,
        Capability::Transfer,
        Capability::UpdateMetadata,
        Capability::UpdatePermissions,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Mint => write!(f, "mint"),
            Capability::Burn => write!(f, "burn"),
            Capability::Transfer => write!(f, "transfer"),
            Capability::UpdateMetadata => write!(f, "update-metadata"),
            Capability::UpdatePermissions => write!(f, "update-permissions"),
        }
    }
}

/// Enumerated denial reasons so callers can branch without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The identity is not in the grant set for the required capability.
    MissingCapability(Capability),
    /// The identity does not own the domain.
    NotOwner,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::MissingCapability(cap) => {
                write!(f, "missing {} capability", cap)
            }
            DenyReason::NotOwner => write!(f, "not the owner"),
        }
    }
}

/// Check whether `address` holds `capability` over `token`.
pub fn authorize_token(
    address: &str,
    token: &Token,
    capability: Capability,
) -> Result<(), DenyReason> {
    if token.has_capability(address, capability) {
        Ok(())
    } else {
        Err(DenyReason::MissingCapability(capability))
    }
}

/// Check whether `address` owns `domain`. Ownership implies every
/// domain-mutating right.
pub fn authorize_domain(address: &str, domain: &Domain) -> Result<(), DenyReason> {
    if domain.owner == address {
        Ok(())
    } else {
        Err(DenyReason::NotOwner)
    }
}
