//! Cache management commands

use colored::Colorize;

use crate::cli::{CommandContext, OutputFormat};
use crate::error::Result;
use crate::models::CacheDisplay;
use crate::models::display::format_size;
use crate::output;
use crate::worker::ACTIVE_GENERATION_KEY;

/// Show per-cache statistics
pub fn status(ctx: &CommandContext) -> Result<()> {
    let cache = ctx.open_caches()?;
    let stats = cache.stats()?;
    let rows: Vec<CacheDisplay> = stats.iter().map(CacheDisplay::from).collect();
    let total: usize = rows.iter().map(|r| r.total_size_bytes).sum();
    let active = cache.get_meta(ACTIVE_GENERATION_KEY)?;

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": ctx.cache_dir().display().to_string(),
                "active_generation": active,
                "total_size_bytes": total,
                "total_size_human": format_size(total),
                "caches": rows,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => output::print(&rows, ctx.format)?,
        OutputFormat::Pretty => {
            println!("Cache Status");
            println!("────────────────────────────────────────");
            println!("Location:       {}", ctx.cache_dir().display());
            println!(
                "Active:         {}",
                active.as_deref().unwrap_or("none").cyan()
            );
            println!("Total size:     {}", format_size(total));
            println!();
            output::print(&rows, ctx.format)?;
        }
    }

    Ok(())
}

/// Delete every cache and its entries
pub fn clear(ctx: &CommandContext) -> Result<()> {
    let cache = ctx.open_caches()?;
    let stats = cache.clear_all()?;

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries_removed": stats.entries_removed,
                "caches_removed": stats.caches_removed,
                "success": true,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            if stats.caches_removed > 0 {
                println!(
                    "Cleared {} cache entries from {} caches",
                    stats.entries_removed, stats.caches_removed
                );
            } else {
                println!("Cache was already empty");
            }
        }
    }

    Ok(())
}

/// Show cache path
pub fn path(ctx: &CommandContext) -> Result<()> {
    println!("{}", ctx.cache_dir().display());
    Ok(())
}
