//! Offline queue commands

use colored::Colorize;

use crate::cli::CommandContext;
use crate::error::{Error, Result};
use crate::models::RecordDisplay;
use crate::output;

/// List every story kept on this device, newest first
pub async fn list(ctx: &CommandContext) -> Result<()> {
    let records = ctx.queue().all().await?;
    let rows: Vec<RecordDisplay> = records.iter().map(RecordDisplay::from).collect();
    output::print(&rows, ctx.format)
}

/// Remove a story from this device
pub async fn delete(ctx: &CommandContext, id: &str) -> Result<()> {
    let queue = ctx.queue();
    let record = queue.get(id).await?;
    let Some(record) = record else {
        return Err(Error::Other(format!("No story {} on this device", id)));
    };

    queue.remove(id).await?;
    if !record.is_temporary() {
        println!("{} Removed saved story {}", "✓".green(), id);
    } else {
        println!(
            "{} Removed {} (it will not be uploaded)",
            "✓".green(),
            id.bold()
        );
    }
    Ok(())
}
