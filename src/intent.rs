//! Transaction Intents
//!
//! An intent is the signed, self-contained description of one mutating
//! operation. [`IntentBuilder::build`] runs the full authorization pipeline
//! in a fixed order: resolve the active identity, check capabilities,
//! validate the payload, unlock the key material, then sign. The secret is
//! needed exactly once, at the unlock step, and only after the operation has
//! already been authorized and validated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::authz::{self, Capability};
use crate::error::PipelineError;
use crate::identity::IdentityStore;
use crate::keys::verify_signature;
use crate::naming::{self, DomainRegistry, RecordType};
use crate::session::Session;
use crate::token::TokenRegistry;

/// Domain separator mixed into every intent signature
const SIGNING_CONTEXT: &[u8] = b"meridian-intent-v1";

/// One mutating operation against a token or domain.
///
/// Uses bincode's default externally tagged layout so the signing bytes are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    TokenMint { to: String, amount: u64 },
    TokenBurn { amount: u64 },
    TokenTransfer { to: String, amount: u64 },
    TokenSetMetadata { key: String, value: String },
    TokenGrant { address: String, capability: Capability },
    TokenRevoke { address: String, capability: Capability },

    DomainRegister { period_days: u64 },
    DomainRenew { period_days: u64 },
    DomainTransfer { to: String },
    DomainSetRecord { record: RecordType, value: String },
    DomainRemoveRecord { record: RecordType },
    DomainSetResolver { resolver: Option<String> },
}

impl Operation {
    /// The token capability this operation requires, if it targets a token
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Operation::TokenMint { .. } => Some(Capability::Mint),
            Operation::TokenBurn { .. } => Some(Capability::Burn),
            Operation::TokenTransfer { .. } => Some(Capability::Transfer),
            Operation::TokenSetMetadata { .. } => Some(Capability::UpdateMetadata),
            Operation::TokenGrant { .. } | Operation::TokenRevoke { .. } => {
                Some(Capability::UpdatePermissions)
            }
            _ => None,
        }
    }

    /// Whether this operation targets a domain
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Operation::DomainRegister { .. }
                | Operation::DomainRenew { .. }
                | Operation::DomainTransfer { .. }
                | Operation::DomainSetRecord { .. }
                | Operation::DomainRemoveRecord { .. }
                | Operation::DomainSetResolver { .. }
        )
    }

    /// Short verb for logs and receipts
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::TokenMint { .. } => "token-mint",
            Operation::TokenBurn { .. } => "token-burn",
            Operation::TokenTransfer { .. } => "token-transfer",
            Operation::TokenSetMetadata { .. } => "token-set-metadata",
            Operation::TokenGrant { .. } => "token-grant",
            Operation::TokenRevoke { .. } => "token-revoke",
            Operation::DomainRegister { .. } => "domain-register",
            Operation::DomainRenew { .. } => "domain-renew",
            Operation::DomainTransfer { .. } => "domain-transfer",
            Operation::DomainSetRecord { .. } => "domain-set-record",
            Operation::DomainRemoveRecord { .. } => "domain-remove-record",
            Operation::DomainSetResolver { .. } => "domain-set-resolver",
        }
    }
}

/// The exact bytes covered by an intent signature.
///
/// Everything except the signature itself, in field order.
#[derive(Serialize)]
struct SigningView<'a> {
    from: &'a str,
    operation: &'a Operation,
    target: &'a str,
    created_at: u64,
}

/// A signed transaction intent, ready to apply locally or submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionIntent {
    /// Address of the signing identity
    pub from: String,
    pub operation: Operation,
    /// Token id or domain name the operation targets
    pub target: String,
    /// Unix timestamp at signing time
    pub created_at: u64,
    /// ed25519 signature over the signing view (hex on the wire)
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl TransactionIntent {
    fn signing_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        let view = SigningView {
            from: &self.from,
            operation: &self.operation,
            target: &self.target,
            created_at: self.created_at,
        };
        bincode::serialize(&view)
            .map_err(|e| PipelineError::InvalidPayload(format!("failed to encode intent: {e}")))
    }

    /// Verify the signature against the signer's public key
    pub fn verify(&self, public_key: &[u8; 32]) -> Result<(), PipelineError> {
        let message = self.signing_bytes()?;
        if verify_signature(public_key, SIGNING_CONTEXT, &message, &self.signature) {
            Ok(())
        } else {
            Err(PipelineError::InvalidPayload(
                "intent signature verification failed".into(),
            ))
        }
    }

    /// Content hash identifying this intent (covers the signature)
    pub fn hash(&self) -> Result<String, PipelineError> {
        let mut hasher = Sha256::new();
        hasher.update(SIGNING_CONTEXT);
        hasher.update(self.signing_bytes()?);
        hasher.update(&self.signature);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Hex encoding of the full intent, the submission wire format
    pub fn to_hex(&self) -> Result<String, PipelineError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| PipelineError::InvalidPayload(format!("failed to encode intent: {e}")))?;
        Ok(hex::encode(bytes))
    }

    /// Intent with an empty signature, for registry-level tests that
    /// exercise apply logic below the signing layer.
    #[cfg(test)]
    pub(crate) fn unsigned_for_tests(from: &str, operation: Operation, target: &str) -> Self {
        Self {
            from: from.to_string(),
            operation,
            target: target.to_string(),
            created_at: 0,
            signature: Vec::new(),
        }
    }
}

/// Builds signed intents by running the authorization pipeline.
pub struct IntentBuilder<'a> {
    identities: &'a IdentityStore,
    tokens: &'a TokenRegistry,
    domains: &'a DomainRegistry,
}

impl<'a> IntentBuilder<'a> {
    pub fn new(
        identities: &'a IdentityStore,
        tokens: &'a TokenRegistry,
        domains: &'a DomainRegistry,
    ) -> Self {
        Self {
            identities,
            tokens,
            domains,
        }
    }

    /// Build and sign an intent for `operation` against `target`.
    ///
    /// Pipeline order is fixed: identity resolution, authorization, payload
    /// validation, unlock, signature. An earlier failure short-circuits, so
    /// an unauthorized caller is told `Unauthorized` even when the payload
    /// is also malformed, and the password is never checked for a request
    /// that would be rejected anyway.
    pub fn build(
        &self,
        session: &Session,
        operation: Operation,
        target: &str,
        secret: &str,
    ) -> Result<TransactionIntent, PipelineError> {
        // 1. Resolve the active identity.
        let address = session.active().ok_or(PipelineError::NoActiveIdentity)?;
        let identity = self.identities.require(address)?;

        let now = naming::unix_now();

        // 2 & 3. Authorize, then validate the payload against current state.
        if operation.is_domain() {
            let target = naming::normalize_name(target)?;
            match &operation {
                Operation::DomainRegister { period_days } => {
                    // Anyone may register an available name.
                    naming::period_secs(*period_days)?;
                    self.domains.check_available(&target, now)?;
                }
                op => {
                    let domain = self.domains.require(&target)?;
                    authz::authorize_domain(address, domain)
                        .map_err(PipelineError::Unauthorized)?;
                    domain.validate(op, now)?;
                }
            }
        } else {
            let token = self.tokens.require(target)?;
            if let Some(capability) = operation.required_capability() {
                authz::authorize_token(address, token, capability)
                    .map_err(PipelineError::Unauthorized)?;
            }
            token.validate(address, &operation)?;
        }

        // 4. Unlock. This is the only step that touches the secret.
        let keys = identity.unlock(secret)?;

        // 5. Sign. Domain targets are stored normalized.
        let target = if operation.is_domain() {
            naming::normalize_name(target)?
        } else {
            target.to_string()
        };
        let mut intent = TransactionIntent {
            from: address.to_string(),
            operation,
            target,
            created_at: now,
            signature: Vec::new(),
        };
        let message = intent.signing_bytes()?;
        intent.signature = keys.sign(SIGNING_CONTEXT, &message);

        Ok(intent)
    }
}
