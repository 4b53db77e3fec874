//! Session Context
//!
//! Tracks which identity is active and which run mode is in effect for the
//! duration of one invocation. The session never caches unlocked key
//! material or secrets; it holds only the active address and re-resolves
//! against the keystore when the active identity changes or goes away.

use tracing::debug;

use crate::dispatch::RunMode;
use crate::error::PipelineError;
use crate::identity::IdentityStore;

/// Per-invocation session state.
#[derive(Debug, Clone)]
pub struct Session {
    active: Option<String>,
    mode: RunMode,
}

impl Session {
    /// Session with the keystore's default identity active, if any
    pub fn initialize(identities: &IdentityStore, mode: RunMode) -> Self {
        let active = identities.default_identity().map(|i| i.address.clone());
        Self { active, mode }
    }

    /// Session with no active identity
    pub fn empty(mode: RunMode) -> Self {
        Self { active: None, mode }
    }

    /// Address of the active identity, if one is set
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Make `address` the active identity for this session.
    ///
    /// Fails when the keystore has no such identity; the session is left
    /// unchanged on failure.
    pub fn switch_active(
        &mut self,
        identities: &IdentityStore,
        address: &str,
    ) -> Result<(), PipelineError> {
        identities.require(address)?;
        debug!(address, "switching active identity");
        self.active = Some(address.to_string());
        Ok(())
    }

    /// Restore a previously active address, ignoring it if it no longer
    /// exists in the keystore.
    ///
    /// An address remembered across invocations may have been removed in
    /// the meantime; the session then keeps the keystore default it was
    /// initialized with, so the fallback is deterministic, never dangling.
    pub fn restore_active(&mut self, identities: &IdentityStore, address: &str) {
        if identities.get(address).is_some() {
            self.active = Some(address.to_string());
        } else {
            debug!(address, "remembered active identity no longer exists");
        }
    }
}
