//! Naming system commands

use anyhow::Result;
use clap::Subcommand;
use std::path::Path;

use crate::config::{domains_path, Config};
use crate::dispatch::RunMode;
use crate::intent::Operation;
use crate::naming::{self, DomainRegistry, RecordType, DEFAULT_PERIOD_DAYS};

use super::{print_success, report_outcome, run_pipeline};

#[derive(Subcommand)]
pub enum DomainCmd {
    /// List domains in the local registry
    List {
        /// Only domains owned by this address
        #[arg(long)]
        owner: Option<String>,
    },

    /// Check whether a name can be registered
    Check {
        name: String,
    },

    /// Register a name to the active identity
    Register {
        name: String,

        /// Registration period in days
        #[arg(long, default_value_t = DEFAULT_PERIOD_DAYS)]
        period_days: u64,
    },

    /// Extend a registration
    Renew {
        name: String,

        /// Renewal period in days
        #[arg(long, default_value_t = DEFAULT_PERIOD_DAYS)]
        period_days: u64,
    },

    /// Show one domain
    Show {
        name: String,
    },

    /// Transfer a domain to another address
    Transfer {
        name: String,
        to: String,
    },

    /// Set a record on a domain
    SetRecord {
        name: String,
        #[arg(value_enum)]
        record: RecordType,
        value: String,
    },

    /// Show one record
    GetRecord {
        name: String,
        #[arg(value_enum)]
        record: RecordType,
    },

    /// Remove a record from a domain
    RemoveRecord {
        name: String,
        #[arg(value_enum)]
        record: RecordType,
    },

    /// Set or clear the resolver
    SetResolver {
        name: String,

        /// Resolver address; omit to clear
        resolver: Option<String>,
    },

    /// Resolve a name to an address
    Resolve {
        name: String,
    },

    /// Find the name pointing at an address
    Reverse {
        address: String,
    },
}

pub async fn run(cmd: DomainCmd, data_dir: &Path, config: &Config, mode: RunMode) -> Result<()> {
    match cmd {
        DomainCmd::List { owner } => list(data_dir, owner.as_deref()),
        DomainCmd::Check { name } => check(data_dir, &name),
        DomainCmd::Register { name, period_days } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::DomainRegister { period_days },
                &name,
            )
            .await?;
            report_outcome(&outcome, &format!("Registered {} for {} days", name, period_days));
            Ok(())
        }
        DomainCmd::Renew { name, period_days } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::DomainRenew { period_days },
                &name,
            )
            .await?;
            report_outcome(&outcome, &format!("Renewed {} for {} days", name, period_days));
            Ok(())
        }
        DomainCmd::Show { name } => show(data_dir, &name),
        DomainCmd::Transfer { name, to } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::DomainTransfer { to: to.clone() },
                &name,
            )
            .await?;
            report_outcome(&outcome, &format!("Transferred {} to {}", name, to));
            Ok(())
        }
        DomainCmd::SetRecord {
            name,
            record,
            value,
        } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::DomainSetRecord { record, value },
                &name,
            )
            .await?;
            report_outcome(&outcome, &format!("Set {} record on {}", record, name));
            Ok(())
        }
        DomainCmd::GetRecord { name, record } => get_record(data_dir, &name, record),
        DomainCmd::RemoveRecord { name, record } => {
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::DomainRemoveRecord { record },
                &name,
            )
            .await?;
            report_outcome(&outcome, &format!("Removed {} record from {}", record, name));
            Ok(())
        }
        DomainCmd::SetResolver { name, resolver } => {
            let what = match &resolver {
                Some(resolver) => format!("Resolver for {} set to {}", name, resolver),
                None => format!("Resolver for {} cleared", name),
            };
            let outcome = run_pipeline(
                data_dir,
                config,
                mode,
                Operation::DomainSetResolver { resolver },
                &name,
            )
            .await?;
            report_outcome(&outcome, &what);
            Ok(())
        }
        DomainCmd::Resolve { name } => resolve(data_dir, &name),
        DomainCmd::Reverse { address } => reverse(data_dir, &address),
    }
}

fn list(data_dir: &Path, owner: Option<&str>) -> Result<()> {
    let registry = DomainRegistry::open(&domains_path(data_dir))?;
    let now = naming::unix_now();

    let domains: Vec<_> = match owner {
        Some(owner) => registry.list_by_owner(owner).collect(),
        None => registry.list().collect(),
    };

    if domains.is_empty() {
        println!("No domains. Register one with: domain register <name>");
        return Ok(());
    }

    for domain in domains {
        println!(
            "{}  {}  owner {}",
            domain.name,
            domain.status_at(now),
            domain.owner
        );
    }
    Ok(())
}

fn check(data_dir: &Path, name: &str) -> Result<()> {
    let registry = DomainRegistry::open(&domains_path(data_dir))?;
    let name = naming::normalize_name(name)?;

    match registry.check_available(&name, naming::unix_now()) {
        Ok(()) => print_success(&format!("{} is available", name)),
        Err(_) => println!("{} is taken", name),
    }
    Ok(())
}

fn show(data_dir: &Path, name: &str) -> Result<()> {
    let registry = DomainRegistry::open(&domains_path(data_dir))?;
    let domain = registry.require(name)?;
    let now = naming::unix_now();

    println!("Name:       {}", domain.name);
    println!("Status:     {}", domain.status_at(now));
    println!("Owner:      {}", domain.owner);
    println!("Expires at: {}", format_time(domain.expires_at));
    match &domain.resolver {
        Some(resolver) => println!("Resolver:   {}", resolver),
        None => println!("Resolver:   -"),
    }

    if !domain.records().is_empty() {
        println!("Records:");
        for (record, value) in domain.records() {
            println!("  {} = {}", record, value);
        }
    }
    Ok(())
}

fn get_record(data_dir: &Path, name: &str, record: RecordType) -> Result<()> {
    let registry = DomainRegistry::open(&domains_path(data_dir))?;
    let domain = registry.require(name)?;

    match domain.record(record) {
        Some(value) => println!("{}", value),
        None => println!("(not set)"),
    }
    Ok(())
}

fn resolve(data_dir: &Path, name: &str) -> Result<()> {
    let registry = DomainRegistry::open(&domains_path(data_dir))?;

    match registry.resolve(name, naming::unix_now()) {
        Some(address) => println!("{}", address),
        None => println!("(does not resolve)"),
    }
    Ok(())
}

fn reverse(data_dir: &Path, address: &str) -> Result<()> {
    let registry = DomainRegistry::open(&domains_path(data_dir))?;

    match registry.reverse_resolve(address, naming::unix_now()) {
        Some(name) => println!("{}", name),
        None => println!("(no name)"),
    }
    Ok(())
}

fn format_time(unix: u64) -> String {
    chrono::DateTime::from_timestamp(unix as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix.to_string())
}
