//! Mode Dispatcher
//!
//! Routes a signed intent to local application (offline mode) or network
//! submission (online mode). The two paths never mix: offline mode mutates
//! the local registries directly, online mode hands the intent to a
//! submission channel and NEVER touches local registry state, not even
//! speculatively. Either way the signature is verified first; an intent
//! that fails verification is not applied or submitted.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::identity::IdentityStore;
use crate::intent::TransactionIntent;
use crate::naming::{self, DomainRegistry};
use crate::token::TokenRegistry;

/// How long to wait for a submission before giving up
pub const SUBMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Where intents are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Apply intents directly to the local registries
    Offline,
    /// Submit intents to a network endpoint
    Online,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Offline => write!(f, "offline"),
            RunMode::Online => write!(f, "online"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(RunMode::Offline),
            "online" => Ok(RunMode::Online),
            other => Err(PipelineError::InvalidPayload(format!(
                "unknown mode: {other} (expected offline or online)"
            ))),
        }
    }
}

/// Acknowledgement from a submission channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Transaction hash assigned on acceptance
    pub tx_hash: String,
}

/// A transport that can submit intents to the network.
pub trait SubmissionChannel {
    fn submit(
        &self,
        intent: &TransactionIntent,
    ) -> impl std::future::Future<Output = Result<SubmitReceipt, PipelineError>> + Send;
}

/// Result of dispatching one intent.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Applied to the local registries (offline mode)
    Applied { tx_hash: String },
    /// Accepted by the network (online mode)
    Submitted { tx_hash: String },
}

impl DispatchOutcome {
    pub fn tx_hash(&self) -> &str {
        match self {
            DispatchOutcome::Applied { tx_hash } | DispatchOutcome::Submitted { tx_hash } => {
                tx_hash
            }
        }
    }
}

/// Routes verified intents per run mode.
pub struct Dispatcher {
    mode: RunMode,
}

impl Dispatcher {
    pub fn new(mode: RunMode) -> Self {
        Self { mode }
    }

    /// Verify and dispatch `intent`.
    ///
    /// Offline mode applies to the targeted local registry; online mode
    /// submits through `channel` under [`SUBMISSION_TIMEOUT`]. A timeout
    /// leaves local state untouched: the intent's fate is unknown and the
    /// caller must not assume it was applied.
    pub async fn dispatch<C: SubmissionChannel>(
        &self,
        intent: &TransactionIntent,
        identities: &IdentityStore,
        tokens: &mut TokenRegistry,
        domains: &mut DomainRegistry,
        channel: &C,
    ) -> Result<DispatchOutcome, PipelineError> {
        let public_key = identities.require(&intent.from)?.public_key_bytes()?;
        intent.verify(&public_key)?;

        let tx_hash = intent.hash()?;
        debug!(kind = intent.operation.kind(), tx_hash, mode = %self.mode, "dispatching intent");

        match self.mode {
            RunMode::Offline => {
                if intent.operation.is_domain() {
                    domains.apply(intent, naming::unix_now())?;
                } else {
                    tokens.apply(intent)?;
                }
                info!(tx_hash, "intent applied locally");
                Ok(DispatchOutcome::Applied { tx_hash })
            }
            RunMode::Online => {
                let receipt = tokio::time::timeout(SUBMISSION_TIMEOUT, channel.submit(intent))
                    .await
                    .map_err(|_| PipelineError::SubmissionTimeout)??;
                info!(tx_hash = receipt.tx_hash, "intent submitted");
                Ok(DispatchOutcome::Submitted {
                    tx_hash: receipt.tx_hash,
                })
            }
        }
    }
}
