//! CLI Commands
//!
//! Implementation of all utility CLI commands.

pub mod config;
pub mod domain;
pub mod identity;
pub mod token;

use anyhow::Result;
use std::io::{self, Write};
use std::path::Path;

use crate::config::{self as cfg, Config};
use crate::dispatch::{DispatchOutcome, Dispatcher, RunMode};
use crate::error::PipelineError;
use crate::identity::IdentityStore;
use crate::intent::{IntentBuilder, Operation};
use crate::naming::DomainRegistry;
use crate::rpc::RpcClient;
use crate::session::Session;
use crate::token::TokenRegistry;

/// Minimum password length for new identities
const MIN_SECRET_LEN: usize = 8;

/// Prompt for password input (hidden)
pub fn prompt_password(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let password = rpassword::read_password()?;
    Ok(password)
}

/// Prompt for a new password plus confirmation.
///
/// Both entries are returned as typed; the keystore compares them so a
/// mismatch surfaces through the normal error taxonomy.
pub fn prompt_new_secret() -> Result<(String, String)> {
    let secret = prompt_password("Enter new password: ")?;
    if secret.len() < MIN_SECRET_LEN {
        anyhow::bail!("password must be at least {} characters", MIN_SECRET_LEN);
    }
    let confirm = prompt_password("Confirm password: ")?;
    Ok((secret, confirm))
}

/// Prompt for confirmation
pub fn prompt_confirm(message: &str) -> Result<bool> {
    print!("{} [y/N]: ", message);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("\x1b[31mError:\x1b[0m {}", message);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("\x1b[32m{}\x1b[0m", message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("\x1b[33mWarning:\x1b[0m {}", message);
}

/// All three local stores, opened together
pub(crate) struct Stores {
    pub identities: IdentityStore,
    pub tokens: TokenRegistry,
    pub domains: DomainRegistry,
}

pub(crate) fn open_stores(data_dir: &Path) -> Result<Stores, PipelineError> {
    Ok(Stores {
        identities: IdentityStore::open(&cfg::keystore_path(data_dir))?,
        tokens: TokenRegistry::open(&cfg::tokens_path(data_dir))?,
        domains: DomainRegistry::open(&cfg::domains_path(data_dir))?,
    })
}

/// Session for this invocation: the keystore default, overridden by the
/// config's remembered `identity use` choice when it still exists.
pub(crate) fn make_session(config: &Config, identities: &IdentityStore, mode: RunMode) -> Session {
    let mut session = Session::initialize(identities, mode);
    if let Some(address) = &config.active_identity {
        session.restore_active(identities, address);
    }
    session
}

/// Run the full pipeline for one mutating operation.
///
/// Prompts for the password exactly once. A `Conflict` from a concurrent
/// writer is retried once against reloaded state; every other failure is
/// reported as-is.
pub(crate) async fn run_pipeline(
    data_dir: &Path,
    config: &Config,
    mode: RunMode,
    operation: Operation,
    target: &str,
) -> Result<DispatchOutcome, PipelineError> {
    let mut stores = open_stores(data_dir)?;
    let session = make_session(config, &stores.identities, mode);

    let secret =
        prompt_password("Enter password: ").map_err(|e| PipelineError::Storage(e.to_string()))?;

    let channel = RpcClient::new(&config.rpc_endpoint)?;
    let dispatcher = Dispatcher::new(mode);

    let intent = IntentBuilder::new(&stores.identities, &stores.tokens, &stores.domains).build(
        &session,
        operation.clone(),
        target,
        &secret,
    )?;

    match dispatcher
        .dispatch(
            &intent,
            &stores.identities,
            &mut stores.tokens,
            &mut stores.domains,
            &channel,
        )
        .await
    {
        Err(PipelineError::Conflict) => {
            // A concurrent writer moved the store; retry once against the
            // fresh state without prompting again.
            print_warning("store changed concurrently, retrying");
            stores.tokens.reload()?;
            stores.domains.reload()?;

            let intent = IntentBuilder::new(&stores.identities, &stores.tokens, &stores.domains)
                .build(&session, operation, target, &secret)?;

            dispatcher
                .dispatch(
                    &intent,
                    &stores.identities,
                    &mut stores.tokens,
                    &mut stores.domains,
                    &channel,
                )
                .await
        }
        other => other,
    }
}

/// Report a dispatch outcome to the user
pub(crate) fn report_outcome(outcome: &DispatchOutcome, what: &str) {
    match outcome {
        DispatchOutcome::Applied { tx_hash } => {
            print_success(&format!("{} (applied locally)", what));
            println!("Transaction: {}", tx_hash);
        }
        DispatchOutcome::Submitted { tx_hash } => {
            print_success(&format!("{} (submitted)", what));
            println!("Transaction: {}", tx_hash);
        }
    }
}
