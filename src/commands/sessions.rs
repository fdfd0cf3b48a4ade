//! Sessions command handler

use anyhow::Result;

use wxexport::{Config, Exporter};

use super::{describe_account, open_account, open_group, truncate_string};
use crate::cli::BackupArgs;

/// List conversations of the selected account, most recent first.
#[cfg(not(tarpaulin_include))]
pub fn handle(target: &BackupArgs, json: bool, all: bool, config: &Config) -> Result<()> {
    let (index, account) = open_account(&target.backup, target.user.as_deref(), config)?;
    let group = open_group(&target.backup, config);
    let mut exporter = Exporter::new(&index, &account)
        .with_detailed_contacts(config.export.detailed_contacts)
        .with_cell_data_version(&config.export.cell_data_version);
    if let Some(group) = &group {
        exporter = exporter.with_group_index(group);
    }
    let data = exporter.load()?;

    let sessions: Vec<_> = data
        .sessions
        .iter()
        .filter(|s| all || !s.is_empty())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    println!(
        "{}: {} conversations, {} contacts",
        describe_account(&account),
        sessions.len(),
        data.contacts.len()
    );
    println!();
    for session in sessions {
        let count = match session.cached_count {
            Some(cached) if cached != session.record_count => {
                format!("{} (cached {})", session.record_count, cached)
            }
            _ => session.record_count.to_string(),
        };
        println!(
            "  {:<28} {:<32} {}",
            truncate_string(&session.display_name, 28),
            truncate_string(session.output_name(), 32),
            count
        );
    }
    Ok(())
}
