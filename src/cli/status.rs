//! Status command implementation

use colored::Colorize;

use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::push::Permission;
use crate::store::trigger::SYNC_TAG;

/// Run the status command to display credential, worker, queue and push state
pub async fn run(ctx: &CommandContext) -> Result<()> {
    let worker = ctx.worker()?;
    let generation = worker.engine().scope().generation.static_name.clone();
    let active = worker.is_current();

    let records = ctx.queue().all().await?;
    let pending = records.iter().filter(|r| !r.synced).count();
    let saved = records.len() - pending;
    let sync_registered = ctx.registrations().is_registered(SYNC_TAG).await?;
    let store_version = ctx.db.version().await?;

    let push = ctx.push_manager();
    let subscription = push.get_subscription().await;
    let permission = push.permission().await;

    if ctx.format == OutputFormat::Json {
        let json = serde_json::json!({
            "config_path": ctx.config_path.display().to_string(),
            "data_dir": ctx.data_dir.display().to_string(),
            "api_base_url": ctx.api.base_url(),
            "logged_in": ctx.token().is_some(),
            "worker": {
                "generation": generation,
                "active": active,
            },
            "queue": {
                "store_version": store_version,
                "pending": pending,
                "saved": saved,
                "sync_registered": sync_registered,
            },
            "push": {
                "permission": format!("{:?}", permission).to_lowercase(),
                "endpoint": subscription.as_ref().map(|s| s.endpoint.clone()),
            },
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}\n", "storykeep Status".bold());
    println!("Config file: {}", ctx.config_path.display().to_string().cyan());
    println!("Data dir:    {}", ctx.data_dir.display().to_string().cyan());
    println!("API:         {}", ctx.api.base_url());
    println!();

    if ctx.token().is_some() {
        println!("{} Logged in", "✓".green());
    } else {
        println!("{} Not logged in", "✗".red());
        println!("  → Run 'storykeep auth login' to store a token");
    }

    if active {
        println!("{} Worker active ({})", "✓".green(), generation);
    } else {
        println!("{} Worker not installed for {}", "○".dimmed(), generation);
        println!("  → Run 'storykeep worker install' while online");
    }

    if pending > 0 {
        println!(
            "{} {} un-synced {} waiting for upload",
            "⚠".yellow(),
            pending,
            if pending == 1 { "story" } else { "stories" }
        );
        if sync_registered {
            println!("  Uploads on the next sync trigger ('storykeep sync')");
        } else {
            println!("  → Run 'storykeep sync' to upload");
        }
    } else {
        println!("{} Nothing waiting for upload", "✓".green());
    }
    if saved > 0 {
        println!("{} {} saved for offline reading", "○".dimmed(), saved);
    }

    match (&subscription, permission) {
        (Some(s), _) => println!("{} Push subscribed ({})", "✓".green(), s.endpoint),
        (None, Permission::Denied) => {
            println!("{} Notification permission denied", "✗".red())
        }
        (None, _) => println!("{} Push not subscribed", "○".dimmed()),
    }

    println!();
    Ok(())
}
