//! Command-line shell over the orchestrator: `scan | classify | move |
//! report | all`, plus a few thin inspection subcommands used while tuning
//! a rule table or category catalog against a real tree.

use clap::{Parser, Subcommand};
use relocate::config::AppConfig;
use relocate::orchestrator::Orchestrator;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "relocate", about = "Classifies and plans relocation for sprawling file trees")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk the configured source roots and populate the catalog.
    Scan,
    /// Classify every unclassified catalog row and synthesize destinations.
    Classify,
    /// Hand planned moves to the configured mover (a no-op without one).
    Move,
    /// Render the cleanup report, duplicate-folders report, and move script.
    Report,
    /// Scan, then classify, then report, in sequence.
    All,
    /// Print the compiled rule table and any load errors.
    Rules,
    /// Print a single file's MIME type, metadata, and content preview.
    Inspect {
        /// Path to the file to inspect.
        path: std::path::PathBuf,
    },
    /// Dump one catalog row's current status.
    Status {
        /// Path as stored in the catalog.
        path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    relocate::init_logging();

    let cli = Cli::parse();
    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = match Orchestrator::new(cfg) {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            tracing::error!(%err, "failed to initialize orchestrator");
            return ExitCode::FAILURE;
        }
    };

    match run(&orchestrator, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(orchestrator: &Orchestrator, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Scan => {
            let summary = orchestrator.run_scan()?;
            println!(
                "scanned {} files ({} newly inserted), hashed {} folders",
                summary.files_found, summary.files_inserted, summary.folders_hashed
            );
        }
        Command::Classify => {
            if !orchestrator.ensure_classifier_available().await {
                return Err("configured classifier is unavailable".into());
            }
            let summary = orchestrator.run_classify().await?;
            println!(
                "classified {} files ({} errored), decided {} folder actions",
                summary.files_classified, summary.files_errored, summary.folders_decided
            );
        }
        Command::Move => {
            let summary = orchestrator.run_move(None).await?;
            println!("moved {} files ({} failed)", summary.files_moved, summary.files_failed);
        }
        Command::Report => {
            let timestamp = report_timestamp();
            let paths = orchestrator.run_report(&timestamp)?;
            println!("cleanup report: {}", paths.cleanup_report.display());
            println!("duplicate folders report: {}", paths.duplicate_folders_report.display());
            println!("move script: {}", paths.move_script.display());
        }
        Command::All => {
            if !orchestrator.ensure_classifier_available().await {
                return Err("configured classifier is unavailable".into());
            }
            let timestamp = report_timestamp();
            let (scan_summary, classify_summary, paths) = orchestrator.run_all(&timestamp).await?;
            println!("scanned {} files", scan_summary.files_found);
            println!("classified {} files ({} errored)", classify_summary.files_classified, classify_summary.files_errored);
            println!("reports written under {}", paths.cleanup_report.parent().unwrap_or(&paths.cleanup_report).display());
        }
        Command::Rules => {
            for rule in &orchestrator.rules().rules {
                println!(
                    "line {}: path={:?} mime={:?} category={} action={:?} requires_ai={:?}",
                    rule.line_number, rule.path_pattern, rule.mime_pattern, rule.category_path, rule.folder_action, rule.requires_ai
                );
            }
            for error in &orchestrator.rules().load_errors {
                eprintln!("rule load error: {error}");
            }
        }
        Command::Inspect { path } => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream().to_string();
            let metadata = relocate::metadata::collect_stat_metadata(&path, std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0));
            println!("mime: {mime}");
            for (key, value) in metadata.iter() {
                println!("{key}: {value}");
            }
        }
        Command::Status { path } => match orchestrator.catalog().status_of(&path)? {
            Some(status) => println!("{status:?}"),
            None => println!("no such path in catalog"),
        },
    }
    Ok(())
}

fn report_timestamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}
