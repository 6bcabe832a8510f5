//! Worker lifecycle commands

use colored::Colorize;

use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::worker::fetch::Request;

/// Precache the manifest into the current generation
pub async fn install(ctx: &CommandContext) -> Result<()> {
    let mut worker = ctx.worker()?;
    let generation = worker.engine().scope().generation.static_name.clone();
    let report = worker.install().await?;

    if ctx.format == OutputFormat::Json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(url, reason)| serde_json::json!({ "url": url, "reason": reason }))
            .collect();
        let json = serde_json::json!({
            "cache": generation,
            "state": worker.state(),
            "cached": report.cached,
            "failed": failed,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!(
        "{} Precached {} entries into {}",
        "✓".green(),
        report.cached.len(),
        generation
    );
    for (url, reason) in &report.failed {
        println!("  {} {} ({})", "✗".red(), url, reason.dimmed());
    }
    println!("  → Run 'storykeep worker activate' to retire old caches");
    Ok(())
}

/// Retire old generations and claim open pages
pub async fn activate(ctx: &CommandContext) -> Result<()> {
    let mut worker = ctx.worker()?;
    let report = worker.activate()?;

    if ctx.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} Activated {}",
        "✓".green(),
        worker.engine().scope().generation.static_name
    );
    if report.deleted_caches.is_empty() {
        println!("  No old caches to remove");
    }
    for name in &report.deleted_caches {
        println!("  Deleted {}", name.dimmed());
    }
    Ok(())
}

/// Send one GET request through the worker
pub async fn fetch(ctx: &CommandContext, url: &str, show_body: bool) -> Result<()> {
    let worker = ctx.started_worker().await?;

    let mut request = Request::get(url)?;
    if let Some(token) = ctx.token()
        && url.starts_with(ctx.config.api_base())
    {
        request = request.with_header("Authorization", &format!("Bearer {}", token));
    }

    let mut intercepted = worker.handle_fetch(&request).await?;
    let status = intercepted.response.status();
    let size = intercepted.response.body_len();
    let content_type = intercepted
        .response
        .header("content-type")
        .unwrap_or("-")
        .to_string();
    let body = show_body.then(|| intercepted.response.clone_response().text());

    if ctx.format == OutputFormat::Json {
        let json = serde_json::json!({
            "url": url,
            "status": status,
            "source": intercepted.source.to_string(),
            "bytes": size,
            "content_type": content_type,
            "body": body,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        let status_text = if intercepted.response.is_ok() {
            status.to_string().green()
        } else {
            status.to_string().red()
        };
        println!(
            "{} {} ({}, {} bytes, from {})",
            status_text,
            url,
            content_type,
            size,
            intercepted.source.to_string().cyan()
        );
        if let Some(body) = body {
            println!("{}", body);
        }
    }

    intercepted.settle().await;
    Ok(())
}
