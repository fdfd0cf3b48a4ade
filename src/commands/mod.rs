//! Command handlers for the wxexport CLI.
//!
//! Each submodule handles one CLI command. The dispatch logic remains in
//! main.rs.

pub mod config;
pub mod export;
pub mod sessions;
pub mod users;

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::warn;

use wxexport::accounts::{self, Account};
use wxexport::{BackupIndex, Config};

/// Truncate a string to a maximum length, adding ellipsis if needed.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    } else {
        s.chars().take(max_len).collect()
    }
}

/// Load the explicit config file, or the default one if present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Index the backup, rejecting encrypted or unreadable ones.
pub fn open_backup(path: &Path, config: &Config) -> Result<BackupIndex> {
    BackupIndex::open(path, &config.export.domain)
        .with_context(|| format!("Cannot use backup at {}", path.display()))
}

/// Index the shared app-group container, if the backup holds one.
pub fn open_group(path: &Path, config: &Config) -> Option<BackupIndex> {
    match BackupIndex::open(path, &config.export.group_domain) {
        Ok(index) if !index.is_empty() => Some(index),
        Ok(_) => None,
        Err(e) => {
            warn!("Ignoring shared container: {}", e);
            None
        }
    }
}

/// Pick the account matching `user`, or the only account in the backup.
pub fn select_account(accounts: Vec<Account>, user: Option<&str>) -> Result<Account> {
    if accounts.is_empty() {
        bail!("No WeChat accounts found in the backup");
    }
    let Some(user) = user else {
        if accounts.len() == 1 {
            return Ok(accounts.into_iter().next().context("No account")?);
        }
        let names: Vec<String> = accounts.iter().map(describe_account).collect();
        bail!(
            "The backup holds {} accounts, choose one with --user:\n  {}",
            accounts.len(),
            names.join("\n  ")
        );
    };

    accounts
        .into_iter()
        .find(|a| {
            a.profile.user_id == user || a.folder_hash == user || a.display_name() == user
        })
        .with_context(|| format!("No account matches '{}'", user))
}

pub fn describe_account(account: &Account) -> String {
    if account.profile.user_id.is_empty() {
        account.folder_hash.clone()
    } else {
        format!("{} ({})", account.display_name(), account.profile.user_id)
    }
}

/// Open the backup and resolve the requested account.
pub fn open_account(backup: &Path, user: Option<&str>, config: &Config) -> Result<(BackupIndex, Account)> {
    let index = open_backup(backup, config)?;
    let account = select_account(accounts::discover(&index), user)?;
    Ok((index, account))
}
