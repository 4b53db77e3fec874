//! Identity management commands

use anyhow::{anyhow, Result};
use clap::Subcommand;
use std::io::{self, Write};
use std::path::Path;
use zeroize::Zeroizing;

use crate::config::{keystore_path, Config};
use crate::identity::IdentityStore;
use crate::keys::{SigningKeys, MNEMONIC_WORDS};

use super::{print_success, print_warning, prompt_confirm, prompt_new_secret, prompt_password};

#[derive(Subcommand)]
pub enum IdentityCmd {
    /// List all identities
    List,

    /// Create a new identity with fresh keys
    Create {
        /// Display name for the identity
        name: String,
    },

    /// Import an identity from a raw secret key
    Import {
        /// Display name for the identity
        name: String,
    },

    /// Import an identity from a recovery phrase
    ImportPhrase {
        /// Display name for the identity
        name: String,
    },

    /// Show one identity (the active one by default)
    Show {
        /// Address to show
        address: Option<String>,
    },

    /// Make an identity active for subsequent commands
    Use {
        /// Address to activate
        address: String,
    },

    /// Flag an identity as the keystore default
    SetDefault {
        /// Address to flag
        address: String,
    },

    /// Rename an identity (its address is unchanged)
    Rename {
        address: String,
        new_name: String,
    },

    /// Export an identity's recovery phrase
    ExportPhrase {
        address: String,
    },

    /// Export an identity's raw secret key (hex)
    ExportKey {
        address: String,
    },

    /// Remove an identity from the keystore
    Remove {
        address: String,
    },
}

pub async fn run(cmd: IdentityCmd, data_dir: &Path, config: &mut Config) -> Result<()> {
    let mut store = IdentityStore::open(&keystore_path(data_dir))?;

    match cmd {
        IdentityCmd::List => list(&store, config),
        IdentityCmd::Create { name } => create(&mut store, &name),
        IdentityCmd::Import { name } => import_key(&mut store, &name),
        IdentityCmd::ImportPhrase { name } => import_phrase(&mut store, &name),
        IdentityCmd::Show { address } => show(&store, config, address.as_deref()),
        IdentityCmd::Use { address } => {
            store.require(&address)?;
            config.active_identity = Some(address.clone());
            config.save(data_dir)?;
            print_success(&format!("Active identity: {}", address));
            Ok(())
        }
        IdentityCmd::SetDefault { address } => {
            store.set_default(&address)?;
            print_success(&format!("Default identity: {}", address));
            Ok(())
        }
        IdentityCmd::Rename { address, new_name } => {
            store.rename(&address, &new_name)?;
            print_success(&format!("Renamed {} to {}", address, new_name));
            Ok(())
        }
        IdentityCmd::ExportPhrase { address } => export_phrase(&store, &address),
        IdentityCmd::ExportKey { address } => export_key(&store, &address),
        IdentityCmd::Remove { address } => remove(&mut store, data_dir, config, &address),
    }
}

fn active_address<'a>(store: &'a IdentityStore, config: &'a Config) -> Option<&'a str> {
    config
        .active_identity
        .as_deref()
        .filter(|addr| store.get(addr).is_some())
        .or_else(|| store.default_identity().map(|i| i.address.as_str()))
}

fn list(store: &IdentityStore, config: &Config) -> Result<()> {
    if store.list().is_empty() {
        println!("No identities. Create one with: identity create <name>");
        return Ok(());
    }

    let active = active_address(store, config);
    let default = store.default_identity().map(|i| i.address.clone());

    for identity in store.list() {
        let mut flags = Vec::new();
        if Some(identity.address.as_str()) == active {
            flags.push("active");
        }
        if Some(&identity.address) == default.as_ref() {
            flags.push("default");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        println!("{}  {}{}", identity.address, identity.name, suffix);
    }
    Ok(())
}

fn create(store: &mut IdentityStore, name: &str) -> Result<()> {
    let (secret, confirm) = prompt_new_secret()?;
    let (identity, keys) = store.create(name, &secret, &confirm)?;

    println!();
    print_success("Identity created!");
    println!();
    println!("Address: {}", identity.address);
    println!();
    println!("Your recovery phrase (24 words):");
    println!();
    for (i, word) in keys.mnemonic_words().iter().enumerate() {
        print!("{:>2}. {:<12}", i + 1, word);
        if (i + 1) % 4 == 0 {
            println!();
        }
    }
    println!();
    print_warning("IMPORTANT: Write down your recovery phrase and store it safely!");
    print_warning("Anyone with this phrase can act as this identity.");

    Ok(())
}

fn import_key(store: &mut IdentityStore, name: &str) -> Result<()> {
    let key_hex = prompt_password("Enter secret key (hex): ")?;
    let key_bytes = Zeroizing::new(hex::decode(key_hex.trim())?);

    let (secret, confirm) = prompt_new_secret()?;
    let identity = store.import_secret_key(name, &key_bytes, &secret, &confirm)?;

    print_success("Identity imported!");
    println!("Address: {}", identity.address);
    Ok(())
}

fn import_phrase(store: &mut IdentityStore, name: &str) -> Result<()> {
    println!("Enter your {}-word recovery phrase:", MNEMONIC_WORDS);
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let phrase = Zeroizing::new(input.trim().to_lowercase());

    let (secret, confirm) = prompt_new_secret()?;
    let identity = store.import_phrase(name, &phrase, &secret, &confirm)?;

    print_success("Identity imported!");
    println!("Address: {}", identity.address);
    Ok(())
}

fn show(store: &IdentityStore, config: &Config, address: Option<&str>) -> Result<()> {
    let address = address
        .or_else(|| active_address(store, config))
        .ok_or_else(|| anyhow!("no identity selected and no default set"))?;
    let identity = store.require(address)?;

    println!("Name:       {}", identity.name);
    println!("Address:    {}", identity.address);
    println!("Public key: {}", identity.public_key);
    Ok(())
}

fn unlock_for_export(store: &IdentityStore, address: &str) -> Result<SigningKeys> {
    let identity = store.require(address)?;
    let secret = prompt_password("Enter password: ")?;
    Ok(identity.unlock(&secret)?)
}

fn export_phrase(store: &IdentityStore, address: &str) -> Result<()> {
    let keys = unlock_for_export(store, address)?;
    let phrase = keys
        .mnemonic_phrase()
        .ok_or_else(|| anyhow!("identity was imported from a raw key and has no phrase"))?;

    print_warning("Anyone with this phrase can act as this identity.");
    println!("{}", phrase);
    Ok(())
}

fn export_key(store: &IdentityStore, address: &str) -> Result<()> {
    let keys = unlock_for_export(store, address)?;

    print_warning("Anyone with this key can act as this identity.");
    println!("{}", hex::encode(keys.secret_key_bytes().as_ref()));
    Ok(())
}

fn remove(
    store: &mut IdentityStore,
    data_dir: &Path,
    config: &mut Config,
    address: &str,
) -> Result<()> {
    store.require(address)?;

    print_warning("Removal is permanent. Without a backup of the recovery phrase");
    print_warning("or secret key, this identity cannot be restored.");
    if !prompt_confirm("Remove this identity?")? {
        println!("Aborted.");
        return Ok(());
    }

    store.remove(address)?;

    // Drop the remembered active identity if it was the one removed.
    if config.active_identity.as_deref() == Some(address) {
        config.active_identity = None;
        config.save(data_dir)?;
    }

    print_success(&format!("Removed {}", address));
    Ok(())
}
