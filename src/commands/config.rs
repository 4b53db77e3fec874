//! Configuration commands

use anyhow::Result;
use clap::Subcommand;
use std::path::Path;

use crate::config::Config;

use super::print_success;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Show current settings
    Show,

    /// Set one setting (network, rpc_endpoint, or mode)
    Set {
        key: String,
        value: String,
    },

    /// Restore default settings
    Reset,
}

pub async fn run(cmd: ConfigCmd, data_dir: &Path, config: &mut Config) -> Result<()> {
    match cmd {
        ConfigCmd::Show => {
            for (key, value) in config.entries() {
                println!("{:<16} {}", key, value);
            }
            Ok(())
        }
        ConfigCmd::Set { key, value } => {
            config.set(&key, &value)?;
            config.save(data_dir)?;
            print_success(&format!("{} = {}", key, value));
            Ok(())
        }
        ConfigCmd::Reset => {
            Config::reset(data_dir)?;
            print_success("Configuration reset to defaults");
            Ok(())
        }
    }
}
