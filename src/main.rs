//! WeChat Exporter - CLI entry point

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ConfigCommands};
use commands::export::Overrides;
use wxexport::Config;

/// Install the log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(not(tarpaulin_include))]
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => {
                commands::config::handle_show(&commands::load_config(config_path)?)
            }
            ConfigCommands::Path => commands::config::handle_path(config_path),
            ConfigCommands::Init => commands::config::handle_init(config_path),
        },
        command => run(command, commands::load_config(config_path)?),
    }
}

/// Dispatch the commands that read a backup.
#[cfg(not(tarpaulin_include))]
fn run(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Users { backup, json } => commands::users::handle(&backup, json, &config),
        Commands::Sessions { target, json, all } => {
            commands::sessions::handle(&target, json, all, &config)
        }
        Commands::Export {
            target,
            output,
            sessions,
            order,
            desc,
            text_only,
            no_avatars,
            icons_in_session,
            workers,
        } => {
            Overrides {
                order,
                desc,
                text_only,
                no_avatars,
                icons_in_session,
                workers,
            }
            .apply(&mut config);
            commands::export::handle(&target, &output, &sessions, &config)
        }
        Commands::Config(_) => unreachable!("config commands are dispatched in main"),
    }
}
