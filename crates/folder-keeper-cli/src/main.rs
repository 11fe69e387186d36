mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use folder_keeper_core::analysis::RouteClass;
use folder_keeper_core::storage::Database;
use folder_keeper_core::{AppConfig, HoldingKind, Keeper, SyncReport};
use progress::CliReporter;
use tracing::{error, info, warn};
use uuid::Uuid;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match folder_keeper_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    if let Err(err) = run(command, config) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    if let Commands::PrintConfig = command {
        println!("Configuration: {:?}", config);
        return Ok(());
    }

    let db = Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;
    let keeper = Keeper::new(Arc::new(db), Arc::new(config));
    let reporter = CliReporter::new();

    match command {
        Commands::Add { path } => {
            let folder = keeper.add_folder(&path)?;
            println!("{} {}", folder.id.to_string().cyan(), folder.root_path.display());
        }
        Commands::List => {
            for folder in keeper.list_folders()? {
                let marker = if folder.is_merge_target { "*".yellow() } else { " ".normal() };
                let summary = match (folder.file_count, folder.total_bytes) {
                    (Some(files), Some(bytes)) => format!("{} files, {} bytes", files, bytes),
                    _ => "never synced".dimmed().to_string(),
                };
                println!(
                    "{} {} {}  {}",
                    marker,
                    folder.id.to_string().cyan(),
                    folder.root_path.display(),
                    summary
                );
            }
        }
        Commands::Files { id } => {
            for item in keeper.list_files(id)? {
                println!(
                    "{}  {:>12}  {}",
                    &item.content_checksum[..12.min(item.content_checksum.len())],
                    item.size_bytes,
                    item.relative_route
                );
            }
        }
        Commands::Sync { id } => {
            let report = keeper.sync(id, &reporter)?;
            print_report(&report);
        }
        Commands::SyncAll => {
            let mut failures = 0;
            for (id, result) in keeper.sync_all(&reporter)? {
                match result {
                    Ok(report) => print_report(&report),
                    Err(e) => {
                        failures += 1;
                        error!("Sync of {} failed: {}", id, e);
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} folder(s) failed to sync", failures);
            }
        }
        Commands::Exclude { id, patterns } => {
            let folder = keeper.set_exclude_patterns(id, patterns)?;
            info!(
                "{} now excludes {:?}",
                folder.root_path.display(),
                folder.exclude_patterns
            );
        }
        Commands::MergeTarget { id, clear } => {
            keeper.set_merge_target(id, !clear)?;
        }
        Commands::Compare { ids } => {
            let comparison = keeper.compare(&ids)?;
            for row in &comparison.rows {
                let label = match row.class {
                    RouteClass::Matching => "same".green(),
                    RouteClass::Mismatched => "diff".red(),
                    RouteClass::UniqueToOne => "only".yellow(),
                };
                let cells: Vec<String> = row
                    .checksums
                    .iter()
                    .map(|c| match c {
                        Some(sum) => sum[..8.min(sum.len())].to_string(),
                        None => "--------".to_string(),
                    })
                    .collect();
                let missing = if row.missing_from_primary { " !" } else { "" };
                println!("{} {}  {}{}", label, cells.join(" "), row.route, missing.red());
            }
            info!(
                "{} routes: {} matching, {} mismatched, {} unique",
                comparison.rows.len(),
                comparison.routes_with(RouteClass::Matching).len(),
                comparison.routes_with(RouteClass::Mismatched).len(),
                comparison.routes_with(RouteClass::UniqueToOne).len(),
            );
        }
        Commands::Copy { source, target } => {
            let report = keeper.copy_files(source, target, &reporter)?;
            print_report(&report);
        }
        Commands::Archive { id } => {
            let snapshot = keeper.archive(id)?;
            println!("Archived {}", snapshot.absolute_route.display());
        }
        Commands::Trash { id } => {
            let snapshot = keeper.trash(id)?;
            println!("Trashed {}", snapshot.absolute_route.display());
        }
        Commands::Restore { id, from } => {
            let folder = keeper.restore(id, from.into())?;
            println!("Restored {}", folder.root_path.display());
        }
        Commands::Purge { id, from, yes } => {
            let kind: HoldingKind = from.into();
            if !yes && !confirm_purge(&keeper, id, kind)? {
                return Ok(());
            }
            keeper.hard_delete(id, kind)?;
            println!("Deleted {} entry {}", kind, id);
        }
        Commands::Retired { from } => {
            for snapshot in keeper.list_retired(from.into())? {
                let when = snapshot
                    .retired_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{} {}  {}",
                    snapshot.id.to_string().cyan(),
                    when.dimmed(),
                    snapshot.absolute_route.display()
                );
            }
        }
        Commands::PrintConfig => {}
    }

    Ok(())
}

fn print_report(report: &SyncReport) {
    println!();
    info!(
        "{}: {} added, {} changed, {} removed, {} unchanged",
        report.folder.root_path.display(),
        format!("{}", report.inserted).green(),
        format!("{}", report.updated).yellow(),
        format!("{}", report.removed).red(),
        report.unchanged,
    );
    info!(
        "Scan: {}, Hash: {}, DB: {}",
        format!("{:.2}s", report.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.hash_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.persist_duration.as_secs_f64()).green(),
    );
    for warning in &report.warnings {
        warn!("Skipped {}: {}", warning.path.display(), warning.message);
    }
}

fn confirm_purge(keeper: &Keeper<Database>, id: Uuid, kind: HoldingKind) -> anyhow::Result<bool> {
    let snapshot = keeper.holding_area(kind).read_sidecar(id)?;
    let prompt = format!(
        "Permanently delete {} from the {}?",
        snapshot.absolute_route.display(),
        kind
    );
    Ok(prompt_confirm(&prompt, Some(false))?)
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
