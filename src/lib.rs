//! Meridian Network Utility
//!
//! A standalone command-line utility for the Meridian network that manages
//! identities, tokens, and names locally.
//!
//! ## Security Model
//!
//! - Private keys never leave the keystore; they are encrypted at rest
//! - Every mutating operation is authorized, validated, and signed locally
//! - Offline mode applies signed intents to local registries
//! - Online mode submits signed intents to an untrusted node via JSON-RPC

pub mod authz;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod intent;
pub mod keys;
pub mod naming;
pub mod rpc;
pub mod session;
pub mod storage;
pub mod token;

pub use dispatch::{DispatchOutcome, Dispatcher, RunMode};
pub use error::PipelineError;
pub use identity::IdentityStore;
pub use intent::{IntentBuilder, Operation, TransactionIntent};
pub use keys::SigningKeys;
pub use naming::DomainRegistry;
pub use session::Session;
pub use token::TokenRegistry;
