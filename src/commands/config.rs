//! Config subcommands handler

use anyhow::Result;
use std::path::{Path, PathBuf};

use wxexport::Config;

fn target_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path(),
    }
}

/// Show the effective configuration as TOML.
#[cfg(not(tarpaulin_include))]
pub fn handle_show(config: &Config) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Print the configuration file path.
#[cfg(not(tarpaulin_include))]
pub fn handle_path(explicit: Option<&Path>) -> Result<()> {
    println!("{}", target_path(explicit)?.display());
    Ok(())
}

/// Write the default configuration unless a file already exists.
#[cfg(not(tarpaulin_include))]
pub fn handle_init(explicit: Option<&Path>) -> Result<()> {
    let path = target_path(explicit)?;
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }
    Config::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
