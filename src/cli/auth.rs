//! Auth commands: the page's credential lives in the config file

use colored::Colorize;
use dialoguer::{Password, theme::ColorfulTheme};

use crate::cli::GlobalOptions;
use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::store::{OfflineQueue, StoryDb};

/// Store a session token
pub async fn login(opts: &GlobalOptions, token: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Enter your story API token")
            .interact()?,
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(ConfigError::Invalid("token must not be empty".to_string()).into());
    }

    // Load without CLI overrides so they are not persisted
    let path = Config::resolve_path(opts.config_ref())?;
    let mut config = Config::load_from(&path)?;
    config.token = Some(token);
    config.save_to(&path)?;

    println!("{} Token saved to {}", "✓".green(), path.display());

    // Queued uploads were waiting for exactly this
    let data_dir = crate::config::data_dir(opts.data_dir_ref())?;
    let db = StoryDb::in_dir(&data_dir);
    if db.path().exists() {
        let queue = OfflineQueue::new(std::sync::Arc::new(db));
        let pending = queue.pending().await?.len();
        if pending > 0 {
            println!(
                "  → {} offline {} waiting. Run {} to upload.",
                pending,
                if pending == 1 { "story" } else { "stories" },
                "storykeep sync".cyan()
            );
        }
    }

    Ok(())
}

/// Forget the session token
pub fn logout(opts: &GlobalOptions) -> Result<()> {
    let path = Config::resolve_path(opts.config_ref())?;
    let mut config = Config::load_from(&path)?;

    if config.token.take().is_none() {
        println!("{} No token stored", "○".dimmed());
        return Ok(());
    }

    config.save_to(&path)?;
    println!("{} Logged out", "✓".green());
    Ok(())
}
