//! Manual background sync trigger

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::store::trigger::SYNC_TAG;
use crate::sync::{SyncOutcome, SyncReport};

/// Fire outstanding sync registrations, or the queue sync itself when
/// none is registered
pub async fn run(ctx: &CommandContext, no_page: bool) -> Result<()> {
    let worker = ctx.worker()?;
    let page = (!no_page).then(|| ctx.open_page());
    let claimed = worker.claim();
    log::debug!("Worker controls {} page(s)", claimed);

    let spinner = (ctx.format != OutputFormat::Json).then(|| {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message("Syncing offline stories...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    });

    let result = async {
        let mut reports = worker.fire_sync_triggers().await?;
        if reports.is_empty() {
            reports.extend(worker.handle_sync(SYNC_TAG).await?);
        }
        Ok::<_, crate::error::Error>(reports)
    }
    .await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    if let Some(page) = page {
        log::debug!(
            "Page {} answered {} token requests",
            page.id(),
            page.state().token_requests
        );
        page.close().await;
    }
    let reports = result?;

    if ctx.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        print_report(report);
    }
    Ok(())
}

/// One line per sync run
pub fn print_report(report: &SyncReport) {
    match report.outcome {
        SyncOutcome::NothingToSync => println!("{} Nothing to sync", "✓".green()),
        SyncOutcome::NoCredential => {
            println!("{} Not logged in; queued stories stay on this device", "⚠".yellow());
            println!("  → Run 'storykeep auth login', then 'storykeep sync'");
        }
        SyncOutcome::NoClient => println!(
            "{} No page answered the token request; queued stories stay on this device",
            "○".dimmed()
        ),
        SyncOutcome::Completed => {
            println!("{} Uploaded {} offline stories", "✓".green(), report.uploaded);
            if report.failed > 0 {
                println!(
                    "{} {} failed and will be retried on the next sync",
                    "✗".red(),
                    report.failed
                );
            }
        }
    }
}
