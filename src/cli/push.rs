//! Push notification commands

use colored::Colorize;

use crate::bridge::ClickAction;
use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::output::json::format_json;

/// Show support, permission and the current subscription
pub async fn status(ctx: &CommandContext) -> Result<()> {
    let manager = ctx.push_manager();
    let supported = ctx.config.push.service_url.is_some();
    let permission = manager.permission().await;
    let subscription = manager.get_subscription().await;

    if ctx.format == OutputFormat::Json {
        let json = serde_json::json!({
            "supported": supported,
            "permission": format!("{:?}", permission).to_lowercase(),
            "subscription": subscription,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if supported {
        println!("{} Push supported", "✓".green());
    } else {
        println!("{} Push not supported (no push.service_url configured)", "✗".red());
    }
    println!("Permission: {:?}", permission);
    match subscription {
        Some(s) => println!("{} Subscribed: {}", "✓".green(), s.endpoint.cyan()),
        None => println!("{} Not subscribed", "○".dimmed()),
    }
    Ok(())
}

pub async fn subscribe(ctx: &CommandContext) -> Result<()> {
    let subscription = ctx.push_manager().subscribe(ctx.token()).await?;

    if ctx.format == OutputFormat::Json {
        println!("{}", format_json(&subscription)?);
    } else {
        println!("{} Subscribed to story notifications", "✓".green());
        println!("  Endpoint: {}", subscription.endpoint.dimmed());
    }
    Ok(())
}

pub async fn unsubscribe(ctx: &CommandContext) -> Result<()> {
    let removed = ctx.push_manager().unsubscribe(ctx.token()).await?;

    if ctx.format == OutputFormat::Json {
        println!("{}", format_json(&serde_json::json!({ "unsubscribed": removed }))?);
    } else if removed {
        println!("{} Unsubscribed from story notifications", "✓".green());
    } else {
        println!("{} Not subscribed", "○".dimmed());
    }
    Ok(())
}

/// Deliver a push message to the worker
pub async fn receive(ctx: &CommandContext, payload: Option<&str>) -> Result<()> {
    let worker = ctx.worker()?;
    let notification = worker.handle_push(payload.map(str::as_bytes)).await;

    if ctx.format == OutputFormat::Json {
        println!("{}", format_json(&notification)?);
    }
    Ok(())
}

/// Click on a shown notification
pub async fn click(ctx: &CommandContext) -> Result<()> {
    let worker = ctx.worker()?;

    match worker.handle_notification_click().await {
        ClickAction::Focused(id) => println!("{} Focused page {}", "✓".green(), id),
        ClickAction::Open(url) => println!("{} Opening {}", "→".cyan(), url),
    }
    Ok(())
}
