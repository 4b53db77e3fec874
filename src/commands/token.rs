//! Token commands

use anyhow::{anyhow, Result};
use clap::Subcommand;
use std::path::Path;

use crate::authz::Capability;
use crate::config::{tokens_path, Config};
use crate::dispatch::RunMode;
use crate::intent::Operation;
use crate::token::{TokenRegistry, TokenType};

use super::{make_session, open_stores, print_success, report_outcome, run_pipeline};

#[derive(Subcommand)]
pub enum TokenCmd {
    /// List tokens in the local registry
    List {
        /// Only tokens owned by this address
        #[arg(long)]
        owner: Option<String>,
    },

    /// Create a new token owned by the active identity
    Create {
        /// Token name
        name: String,

        /// Ticker symbol
        symbol: String,

        /// Token kind
        #[arg(long = "type", value_enum, default_value = "fungible")]
        token_type: TokenType,

        /// Initial supply, credited to the owner
        #[arg(long, default_value = "0")]
        supply: u64,

        /// Maximum supply (unlimited when omitted)
        #[arg(long)]
        max_supply: Option<u64>,

        /// Decimal places
        #[arg(long, default_value = "18")]
        decimals: u8,
    },

    /// Show one token
    Show {
        /// Token id
        id: String,
    },

    /// Show a balance
    Balance {
        /// Token id
        id: String,

        /// Address to query (the active identity by default)
        address: Option<String>,
    },

    /// Mint new supply to an address
    Mint {
        id: String,
        to: String,
        amount: u64,
    },

    /// Burn supply from the active identity's balance
    Burn {
        id: String,
        amount: u64,
    },

    /// Transfer from the active identity to another address
    Transfer {
        id: String,
        to: String,
        amount: u64,
    },

    /// Set a metadata entry
    SetMetadata {
        id: String,
        key: String,
        value: String,
    },

    /// Grant a capability to an address
    Grant {
        id: String,
        address: String,
        #[arg(value_enum)]
        capability: Capability,
    },

    /// Revoke a capability from an address
    Revoke {
        id: String,
        address: String,
        #[arg(value_enum)]
        capability: Capability,
    },
}

pub async fn run(cmd: TokenCmd, data_dir: &Path, config: &Config, mode: RunMode) -> Result<()> {
    match cmd {
        TokenCmd::List { owner } => list(data_dir, owner.as_deref()),
        TokenCmd::Create {
            name,
            symbol,
            token_type,
            supply,
            max_supply,
            decimals,
        } => create(
            data_dir, config, mode, &name, &symbol, token_type, supply, max_supply, decimals,
        ),
        TokenCmd::Show { id } => show(data_dir, &id),
        TokenCmd::Balance { id, address } => balance(data_dir, config, mode, &id, address),
        TokenCmd::Mint { id, to, amount } => {
            let outcome =
                run_pipeline(data_dir, config, mode, Operation::TokenMint { to, amount }, &id)
                    .await?;
            report_outcome(&outcome, &format!("Minted {} to supply", amount));
            Ok(())
        }
        TokenCmd::Burn { id, amount } => {
            let outcome =
                run_pipeline(data_dir, config, mode, Operation::TokenBurn { amount }, &id).await?;
            report_outcome(&outcome, &format!("Burned {}", amount));
            Ok(())
        }
        TokenCmd::Transfer { id, to, amount } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::TokenTransfer { to, amount },
                &id,
            )
            .await?;
            report_outcome(&outcome, &format!("Transferred {}", amount));
            Ok(())
        }
        TokenCmd::SetMetadata { id, key, value } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::TokenSetMetadata { key, value },
                &id,
            )
            .await?;
            report_outcome(&outcome, "Metadata updated");
            Ok(())
        }
        TokenCmd::Grant {
            id,
            address,
            capability,
        } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::TokenGrant {
                    address: address.clone(),
                    capability,
                },
                &id,
            )
            .await?;
            report_outcome(&outcome, &format!("Granted {} to {}", capability, address));
            Ok(())
        }
        TokenCmd::Revoke {
            id,
            address,
            capability,
        } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::TokenRevoke {
                    address: address.clone(),
                    capability,
                },
                &id,
            )
            .await?;
            report_outcome(&outcome, &format!("Revoked {} from {}", capability, address));
            Ok(())
        }
    }
}

fn list(data_dir: &Path, owner: Option<&str>) -> Result<()> {
    let registry = TokenRegistry::open(&tokens_path(data_dir))?;

    let tokens: Vec<_> = match owner {
        Some(owner) => registry.list_by_owner(owner).collect(),
        None => registry.list().collect(),
    };

    if tokens.is_empty() {
        println!("No tokens. Create one with: token create <name> <symbol>");
        return Ok(());
    }

    for token in tokens {
        println!(
            "{}  {} ({})  supply {}  owner {}",
            token.id, token.name, token.symbol, token.supply, token.owner
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn create(
    data_dir: &Path,
    config: &Config,
    mode: RunMode,
    name: &str,
    symbol: &str,
    token_type: TokenType,
    supply: u64,
    max_supply: Option<u64>,
    decimals: u8,
) -> Result<()> {
    let mut stores = open_stores(data_dir)?;
    let session = make_session(config, &stores.identities, mode);
    let owner = session
        .active()
        .ok_or_else(|| anyhow!("no active identity; create one first"))?
        .to_string();

    let token = stores.tokens.create_token(
        name, symbol, token_type, &owner, supply, max_supply, decimals,
    )?;

    print_success("Token created!");
    println!("Id:     {}", token.id);
    println!("Owner:  {}", token.owner);
    println!("Supply: {}", token.supply);
    Ok(())
}

fn show(data_dir: &Path, id: &str) -> Result<()> {
    let registry = TokenRegistry::open(&tokens_path(data_dir))?;
    let token = registry.require(id)?;

    println!("Id:         {}", token.id);
    println!("Name:       {}", token.name);
    println!("Symbol:     {}", token.symbol);
    println!("Type:       {}", token.token_type);
    println!("Supply:     {}", token.supply);
    match token.max_supply {
        Some(max) => println!("Max supply: {}", max),
        None => println!("Max supply: unlimited"),
    }
    println!("Decimals:   {}", token.decimals);
    println!("Owner:      {}", token.owner);

    if !token.metadata.is_empty() {
        println!("Metadata:");
        for (key, value) in &token.metadata {
            println!("  {} = {}", key, value);
        }
    }

    println!("Grants:");
    for (capability, addresses) in token.grants() {
        for address in addresses {
            println!("  {}  {}", capability, address);
        }
    }
    Ok(())
}

fn balance(
    data_dir: &Path,
    config: &Config,
    mode: RunMode,
    id: &str,
    address: Option<String>,
) -> Result<()> {
    let stores = open_stores(data_dir)?;
    let token = stores.tokens.require(id)?;

    let address = match address {
        Some(address) => address,
        None => make_session(config, &stores.identities, mode)
            .active()
            .ok_or_else(|| anyhow!("no address given and no active identity"))?
            .to_string(),
    };

    println!("{}  {} {}", address, token.balance_of(&address), token.symbol);
    Ok(())
}
