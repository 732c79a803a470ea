//! Tidyflow - rule-driven file organizer
//!
//! Usage:
//!   tidyflow grant Downloads ~/Downloads   # Allow access to a folder
//!   tidyflow rules add Shots --ext png --contains Screenshot --to Pictures/Screenshots
//!   tidyflow scan ~/Desktop                # Track files and suggest destinations
//!   tidyflow organize                      # Apply suggestions
//!   tidyflow undo | redo | history

mod rule_commands;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rule_commands::RulesCommand;
use tidyflow::filesystem::access::{AccessProvider, FixedPicker, FolderPicker, LocalFolderProvider};
use tidyflow::filesystem::config::OrganizerConfig;
use tidyflow::model::{ActionRecord, FileRecord, FileStatus};
use tidyflow::prediction::NoPredictor;
use tidyflow::rules::format_size;
use tidyflow::{Error, Organizer};

#[derive(Parser)]
#[command(name = "tidyflow")]
#[command(about = "Organize files with rules, safely and reversibly")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Destination root (defaults to the configured root, usually $HOME)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a destination path would be accepted
    Validate { path: String },
    /// Grant Tidyflow access to a folder; its name must match EXPECTED
    Grant { expected: String, folder: PathBuf },
    /// Manage rules
    Rules {
        #[command(subcommand)]
        cmd: RulesCommand,
    },
    /// Track files in FOLDER and suggest destinations
    Scan { folder: PathBuf },
    /// List tracked files
    Files,
    /// Apply every ready suggestion
    Organize,
    /// Reverse the most recent action
    Undo,
    /// Re-apply the most recently undone action
    Redo,
    /// Show undo and redo history
    History,
    /// Dismiss a pending file by id or unique id prefix
    Skip { id: String },
    /// Turn down a ready file's suggestion
    Reject { id: String },
}

/// Asks on the terminal which folder to grant.
struct TerminalPicker;

impl FolderPicker for TerminalPicker {
    fn pick(&self, expected_root_name: &str) -> Option<PathBuf> {
        eprint!(
            "{} Tidyflow needs access to '{}'. Folder path (empty to cancel): ",
            "?".yellow(),
            expected_root_name
        );
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tidyflow::logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<Error>() {
            Some(err) => {
                eprintln!("{} {}", "✗".red(), err.user_message());
                if let Some(recovery) = err.recovery() {
                    eprintln!("  {} {:?}", "hint:".dimmed(), recovery);
                }
            }
            None => eprintln!("{} {}", "✗".red(), e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli.config.clone().unwrap_or_else(OrganizerConfig::default_path);
    let mut config = OrganizerConfig::load(&config_path)?;
    if let Some(root) = cli.root {
        config.destination_root = root;
    }

    let provider: Arc<dyn AccessProvider> = match &cli.command {
        Command::Grant { folder, .. } => {
            Arc::new(LocalFolderProvider::new(FixedPicker(Some(folder.clone()))))
        }
        _ => Arc::new(LocalFolderProvider::new(TerminalPicker)),
    };
    let organizer = Arc::new(Organizer::open(config, provider, Arc::new(NoPredictor))?);

    match cli.command {
        Command::Validate { path } => {
            match organizer.operations().validator().validate(&path) {
                Ok(valid) => println!(
                    "{} {} is a valid destination under {}",
                    "✓".green(),
                    valid.cyan(),
                    organizer.config().destination_root.display()
                ),
                Err(e) => {
                    println!("{} {}", "✗".red(), Error::from(e).user_message());
                }
            }
        }
        Command::Grant { expected, .. } => {
            let token = organizer.operations().access().request_access(&expected)?;
            println!(
                "{} Access granted to {}",
                "✓".green(),
                token.canonical_root.display()
            );
        }
        Command::Rules { cmd } => rule_commands::run(cmd, &organizer)?,
        Command::Scan { folder } => {
            let scan = async {
                let added = organizer.ingest_folder(&folder).await?;
                println!("{} Tracking {} new file(s)", "●".green(), added);
                organizer.classify().await
            };
            let report = tokio::select! {
                report = scan => report?,
                _ = tokio::signal::ctrl_c() => {
                    organizer.cancel_classification();
                    tracing::info!("Scan cancelled (Ctrl+C)");
                    return Ok(());
                }
            };
            println!(
                "{} {} suggested, {} without a match",
                "●".green(),
                report.suggested,
                report.unmatched
            );
        }
        Command::Files => print_files(&organizer.files()?),
        Command::Organize => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Cancelling batch (Ctrl+C)");
                    on_interrupt.cancel();
                }
            });

            let outcome = organizer.organize_ready(&cancel).await?;
            if outcome.is_empty() {
                println!("{} Nothing is ready to organize", "○".dimmed());
            }
            for (id, result) in outcome {
                match result {
                    Ok(record) => print_action("✓".green(), &record),
                    Err(e) => eprintln!(
                        "{} {} {}",
                        "✗".red(),
                        id.to_string()[..8].dimmed(),
                        e.user_message()
                    ),
                }
            }
        }
        Command::Undo => {
            let record = organizer.undo(&CancellationToken::new()).await?;
            print_action("↶".yellow(), &record);
        }
        Command::Redo => {
            let record = organizer.redo(&CancellationToken::new()).await?;
            print_action("↷".yellow(), &record);
        }
        Command::History => {
            let history = organizer.history()?;
            println!("{}", "Undo (newest first)".bold());
            for record in &history.undo {
                print_action("•".normal(), record);
            }
            if !history.redo.is_empty() {
                println!("{}", "Redo".bold());
                for record in &history.redo {
                    print_action("•".dimmed(), record);
                }
            }
        }
        Command::Skip { id } => {
            let files = organizer.files()?;
            let file_id = resolve_id(files.iter().map(|f| f.id), &id)?;
            let file = organizer.dismiss(file_id)?;
            println!("{} Skipped {}", "✓".green(), file.name);
        }
        Command::Reject { id } => {
            let files = organizer.files()?;
            let file_id = resolve_id(files.iter().map(|f| f.id), &id)?;
            let file = organizer.reject(file_id)?;
            println!(
                "{} Rejected {} for {}",
                "✓".green(),
                file.last_rejected_destination.as_deref().unwrap_or_default(),
                file.name
            );
        }
    }
    Ok(())
}

fn print_action(marker: colored::ColoredString, record: &ActionRecord) {
    println!(
        "{} {} {} {} -> {}",
        marker,
        record.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        record.action_type,
        record.source_path.display(),
        record.destination_path.display()
    );
}

fn print_files(files: &[FileRecord]) {
    if files.is_empty() {
        println!("{} No tracked files. Run `tidyflow scan <folder>`.", "○".dimmed());
        return;
    }
    for file in files {
        let status = match file.status() {
            FileStatus::Pending => "pending".normal(),
            FileStatus::Ready => "ready".cyan(),
            FileStatus::Completed => "done".green(),
            FileStatus::Skipped => "skipped".dimmed(),
        };
        let suggestion = file
            .suggestion()
            .map(|s| format!(" -> {} ({})", s.destination, s.reason))
            .unwrap_or_default();
        println!(
            "{} {:<8} {} [{}]{}",
            file.id.to_string()[..8].dimmed(),
            status,
            file.name,
            format_size(file.size),
            suggestion
        );
    }
}

fn resolve_id(ids: impl Iterator<Item = Uuid>, prefix: &str) -> Result<Uuid, String> {
    let prefix = prefix.trim();
    let found: Vec<Uuid> = ids.filter(|id| id.to_string().starts_with(prefix)).collect();
    match found.as_slice() {
        [id] => Ok(*id),
        [] => Err(format!("no file matches '{}'", prefix)),
        _ => Err(format!("'{}' matches {} files; use more of the id", prefix, found.len())),
    }
}
