mod cli;
mod commands;
mod interrupt;
mod paths;
mod settings;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub profile: Option<String>,
    pub environment: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        profile: cli.profile,
        environment: cli.environment,
    };
    log::trace!("Verbosity {}", ctx.verbose);

    match dispatch(&ctx, cli.command) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn dispatch(ctx: &Context, command: Command) -> Result<ExitCode> {
    match command {
        Command::Run(args) => commands::run::run(ctx, args),
        Command::Auth { require } => commands::auth::run(ctx, require),
        Command::Region { region } => commands::region::run(ctx, region).map(|()| ExitCode::SUCCESS),
        Command::Config(cmd) => commands::config::run(ctx, cmd).map(|()| ExitCode::SUCCESS),
        Command::Profile(cmd) => commands::profile::run(ctx, cmd).map(|()| ExitCode::SUCCESS),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "awsctl", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
