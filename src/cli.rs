//! CLI definitions for wxexport
//!
//! This module contains the clap CLI structure definitions, separated from
//! main.rs so the command handlers can share them.

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use wxexport::normalizer::SortOrder;

/// Build clap styles for consistent CLI appearance.
pub fn build_cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::White.on_default())
        .valid(AnsiColor::White.on_default())
        .invalid(AnsiColor::Red.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
}

#[derive(Parser)]
#[command(name = "wxexport")]
#[command(about = "[ WeChat Exporter ] - rebuild chat histories from an iOS device backup")]
#[command(
    long_about = "WeChat Exporter - rebuild chat histories from an unencrypted iOS device backup.

The backup folder is the one written by iTunes or Finder (it contains
Manifest.db). Encrypted backups are rejected.

QUICK START:
    wxexport users ~/Backup/00008030-...           List accounts in the backup
    wxexport sessions ~/Backup/00008030-...        List conversations
    wxexport export ~/Backup/00008030-... ./out    Export every conversation

Logging is controlled with -v/-vv or the RUST_LOG environment variable."
)]
#[command(version, styles = build_cli_styles())]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Read configuration from this file instead of ~/.config/wxexport/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Backup location and account selection shared by the data commands.
#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    /// Backup folder containing Manifest.db
    #[arg(help = "Backup folder containing Manifest.db")]
    pub backup: PathBuf,

    /// Account to use (id, folder hash, or display name)
    #[arg(long, short, help = "Account id, folder hash or display name")]
    pub user: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List accounts found in a backup
    #[command(long_about = "List the accounts that used WeChat on the backed-up device.

EXAMPLE:
    wxexport users ~/Backup/00008030-001A")]
    Users {
        /// Backup folder containing Manifest.db
        backup: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the conversations of an account
    #[command(long_about = "List the conversations of one account with their message counts.

Counts come from the stored message tables, not from the cached chat list.

EXAMPLES:
    wxexport sessions ~/Backup/00008030-001A
    wxexport sessions ~/Backup/00008030-001A --user wxid_abc --json")]
    Sessions {
        #[command(flatten)]
        target: BackupArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Include conversations without stored messages
        #[arg(long)]
        all: bool,
    },

    /// Export conversations to JSON lines plus media
    #[command(long_about = "Export conversations of one account.

Each conversation is written to <OUTPUT>/<id>.jsonl, one record per message,
with media copied to <OUTPUT>/<id>_files/. Press Ctrl+C to stop; sessions
in progress end cleanly.

EXAMPLES:
    wxexport export ~/Backup/00008030-001A ./out
    wxexport export ~/Backup/00008030-001A ./out --session wxid_friend --desc
    wxexport export ~/Backup/00008030-001A ./out --text-only --workers 4")]
    Export {
        #[command(flatten)]
        target: BackupArgs,
        /// Output folder
        output: PathBuf,
        /// Only export these conversations (id or display name)
        #[arg(long = "session", short = 's', value_name = "ID")]
        sessions: Vec<String>,
        /// Record order within each conversation
        #[arg(long, value_enum)]
        order: Option<OrderArg>,
        /// Newest message first (same as --order descending)
        #[arg(long, conflicts_with = "order")]
        desc: bool,
        /// Only emit time, sender and a text description
        #[arg(long)]
        text_only: bool,
        /// Do not fetch avatars
        #[arg(long)]
        no_avatars: bool,
        /// Keep avatars and stickers inside each conversation folder
        #[arg(long)]
        icons_in_session: bool,
        /// Conversations exported in parallel
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderArg {
    Ascending,
    Descending,
}

impl From<OrderArg> for SortOrder {
    fn from(value: OrderArg) -> Self {
        match value {
            OrderArg::Ascending => SortOrder::Ascending,
            OrderArg::Descending => SortOrder::Descending,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write the default configuration file if none exists
    Init,
}
