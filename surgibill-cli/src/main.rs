//! Surgibill CLI - credit-note and doctor-fee rules from the terminal

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{check, get_logger, log_event, logs, reference, resolve, rule, status};
use surgibill_core::services::{LogEvent, LoggingService};

/// Surgibill - surgical billing rule administration
#[derive(Parser)]
#[command(name = "sb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show rule and reference data summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create, update and inspect rules
    Rule {
        #[command(subcommand)]
        command: rule::RuleCommands,
    },

    /// Find the rule that applies to a billing query
    Resolve(resolve::ResolveArgs),

    /// Manage reference data
    Ref {
        #[command(subcommand)]
        command: reference::RefCommands,
    },

    /// Audit the rule set for overlaps and stale data
    Check {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Status { .. } => "status",
            Commands::Rule { .. } => "rule",
            Commands::Resolve(_) => "resolve",
            Commands::Ref { .. } => "ref",
            Commands::Check { .. } => "check",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = get_logger();
    let command = cli.command.name();

    match run(cli, &logger) {
        Ok(()) => {
            log_event(
                &logger,
                LogEvent::new("command_executed").with_command(command),
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("command_failed")
                    .with_command(command)
                    .with_error(e.to_string()),
            );
            output::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, logger: &Option<Arc<LoggingService>>) -> Result<()> {
    match cli.command {
        Commands::Status { json } => status::run(json, logger),
        Commands::Rule { command } => rule::run(command, logger),
        Commands::Resolve(args) => resolve::run(args, logger),
        Commands::Ref { command } => reference::run(command, logger),
        Commands::Check { verbose, json } => check::run(verbose, json, logger),
        Commands::Logs { command } => logs::run(command),
    }
}
