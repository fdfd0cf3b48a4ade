//! Users command handler

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use wxexport::accounts;
use wxexport::Config;

use super::{open_backup, truncate_string};

#[derive(Serialize)]
struct UserRow<'a> {
    user_id: &'a str,
    folder_hash: &'a str,
    display_name: &'a str,
    alias: &'a str,
}

/// List accounts found in the backup.
#[cfg(not(tarpaulin_include))]
pub fn handle(backup: &Path, json: bool, config: &Config) -> Result<()> {
    let index = open_backup(backup, config)?;
    let accounts = accounts::discover(&index);

    if json {
        let rows: Vec<UserRow> = accounts
            .iter()
            .map(|a| UserRow {
                user_id: &a.profile.user_id,
                folder_hash: &a.folder_hash,
                display_name: a.display_name(),
                alias: &a.profile.alias,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!("Accounts: {}", accounts.len());
    println!();
    for account in &accounts {
        println!(
            "  {:<24} {:<24} {}",
            truncate_string(account.display_name(), 24),
            truncate_string(&account.profile.user_id, 24),
            account.folder_hash
        );
    }
    Ok(())
}
