use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::tier::interrupt::Interrupt;
use crate::tier::policy::MigrationPolicy;
use crate::tier::service::ServiceCommand;

#[derive(Debug, Parser)]
#[command(name = "cache-tier")]
#[command(about = "Reconcile the cache tier against the array tier", long_about = None)]
#[command(version)]
struct Cli {
    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Move every ledgered file back to the array, then clear the ledger
    RetireTracked {
        #[arg(long)]
        dry_run: bool,
    },
    /// Move every file the ledger does not track; ledgered files stay
    RetireOther {
        #[arg(long)]
        dry_run: bool,
    },
    /// Move everything under the cache root
    RetireAll {
        #[arg(long)]
        dry_run: bool,
    },
    /// Move only files with a configured media extension
    ReclaimMedia {
        #[arg(long)]
        dry_run: bool,
    },
    /// Move ledgered files cached longer than the age limit
    RetireAged {
        /// Overrides `max_cache_days` from the config
        #[arg(long)]
        max_days: Option<u64>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or edit the ledger of cached files
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
    /// Service liveness, state paths and effective configuration
    Status,
    /// Start, stop or restart the copy-in service
    Service {
        #[arg(value_enum)]
        command: ServiceCommand,
    },
}

#[derive(Debug, Subcommand)]
enum LedgerAction {
    List,
    Add {
        path: PathBuf,
        /// Unix seconds; defaults to now
        #[arg(long)]
        at: Option<f64>,
    },
    Remove {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Drop every entry without moving any file
    Clear,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "issues" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

/// Returns whether the command completed without issues.
pub fn run() -> Result<bool> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::RetireTracked { dry_run } => {
            commands::retire::run(MigrationPolicy::LedgeredOnly, dry_run, sweep_interrupt(dry_run))?
        }
        Command::RetireOther { dry_run } => commands::retire::run(
            MigrationPolicy::NonLedgeredOnly,
            dry_run,
            sweep_interrupt(dry_run),
        )?,
        Command::RetireAll { dry_run } => {
            commands::retire::run(MigrationPolicy::AllFiles, dry_run, sweep_interrupt(dry_run))?
        }
        Command::ReclaimMedia { dry_run } => {
            commands::reclaim_media::run(dry_run, sweep_interrupt(dry_run))?
        }
        Command::RetireAged { max_days, dry_run } => {
            commands::retire_aged::run(max_days, dry_run, sweep_interrupt(dry_run))?
        }
        Command::Ledger { action } => match action {
            LedgerAction::List => commands::ledger::list()?,
            LedgerAction::Add { path, at } => commands::ledger::add(&path, at)?,
            LedgerAction::Remove { paths } => commands::ledger::remove(&paths)?,
            LedgerAction::Clear => commands::ledger::clear()?,
        },
        Command::Status => commands::status::run()?,
        Command::Service { command } => commands::service::run(command)?,
    };

    print_report(&report, cli.json)?;
    Ok(report.ok)
}

// Only a live sweep needs a signal handler; previews stop on the default action.
fn sweep_interrupt(dry_run: bool) -> Interrupt {
    if dry_run {
        Interrupt::new()
    } else {
        Interrupt::install_ctrlc()
    }
}
