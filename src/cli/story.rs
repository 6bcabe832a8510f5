//! Story commands
//!
//! The CLI plays the page here: listings go through the worker so they are
//! served from cache when offline, and uploads fall back to the offline
//! queue when the API cannot be reached.

use std::collections::HashSet;
use std::path::Path;

use colored::Colorize;

use crate::cache::{Intercepted, ResponseSource};
use crate::cli::context::Worker;
use crate::cli::{CommandContext, OutputFormat};
use crate::client::models::StoriesResponse;
use crate::client::{ApiMessage, Story, StoryApi};
use crate::error::{ApiError, Error, Result};
use crate::models::{RecordDisplay, StoryDisplay};
use crate::output::{self, json::format_json_from};
use crate::store::trigger::SYNC_TAG;
use crate::store::{Photo, StoryDraft};
use crate::worker::fetch::Request;

/// Outcome of asking the worker for the story listing
enum Listing {
    Stories {
        stories: Vec<Story>,
        source: ResponseSource,
        intercepted: Intercepted,
    },
    /// Nothing usable came back; carries the reason
    Offline(String),
}

fn listing_request(ctx: &CommandContext) -> Result<Request> {
    let mut request = Request::get(&format!("{}/stories", ctx.config.api_base()))?;
    if let Some(token) = ctx.token() {
        request = request.with_header("Authorization", &format!("Bearer {}", token));
    }
    Ok(request)
}

async fn load_stories(ctx: &CommandContext, worker: &Worker) -> Result<Listing> {
    let request = listing_request(ctx)?;
    let mut intercepted = match worker.handle_fetch(&request).await {
        Ok(intercepted) => intercepted,
        Err(e) => return Ok(Listing::Offline(e.to_string())),
    };

    let source = intercepted.source;
    let response = intercepted.response.clone_response();
    if matches!(source, ResponseSource::Shell | ResponseSource::Unavailable)
        || response.is_network_error()
    {
        intercepted.settle().await;
        return Ok(Listing::Offline(
            "the story API is unreachable and no listing is cached".to_string(),
        ));
    }

    let status = response.status();
    if status == 401 {
        return Err(ApiError::Unauthorized.into());
    }
    if !response.is_ok() {
        let message = response
            .json::<ApiMessage>()
            .map(|m| m.message)
            .unwrap_or_default();
        return Err(if status >= 500 {
            ApiError::ServerError(message)
        } else {
            ApiError::BadRequest(format!("status {}: {}", status, message))
        }
        .into());
    }

    let parsed: StoriesResponse = response
        .json()
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
    if parsed.error {
        return Err(ApiError::BadRequest(parsed.message).into());
    }

    Ok(Listing::Stories {
        stories: parsed.list_story,
        source,
        intercepted,
    })
}

/// List stories, falling back to the device's saved copies when offline
pub async fn list(ctx: &CommandContext) -> Result<()> {
    let _page = ctx.open_page();
    let worker = ctx.started_worker().await?;
    let queue = ctx.queue();

    match load_stories(ctx, &worker).await? {
        Listing::Stories {
            stories,
            source,
            mut intercepted,
        } => {
            let saved: HashSet<String> = queue
                .all()
                .await?
                .into_iter()
                .filter(|r| r.synced)
                .map(|r| r.id)
                .collect();

            if ctx.format == OutputFormat::Json {
                println!("{}", format_json_from(&stories, &source.to_string())?);
            } else {
                let rows: Vec<StoryDisplay> = stories
                    .iter()
                    .map(|s| StoryDisplay::new(s, saved.contains(&s.id)))
                    .collect();
                output::print(&rows, ctx.format)?;
                if ctx.format == OutputFormat::Pretty {
                    println!("{}", format!("from {}", source).dimmed());
                }
            }

            intercepted.settle().await;

            // Back online: give outstanding background syncs their trigger
            if source == ResponseSource::Network && !ctx.registrations().tags().await?.is_empty() {
                for report in worker.fire_sync_triggers().await? {
                    super::sync::print_report(&report);
                }
            }
        }
        Listing::Offline(reason) => {
            eprintln!(
                "{} Offline ({}). Showing stories saved on this device.",
                "⚠".yellow(),
                reason
            );
            let records = queue.all().await?;
            let rows: Vec<RecordDisplay> = records.iter().map(RecordDisplay::from).collect();
            if ctx.format == OutputFormat::Json {
                println!("{}", format_json_from(&rows, "offline")?);
            } else {
                output::print(&rows, ctx.format)?;
            }
        }
    }

    Ok(())
}

/// Share a story; an unreachable or failing API sends it to the offline
/// queue, while rejected input and missing auth are reported
pub async fn add(
    ctx: &CommandContext,
    description: String,
    photo_path: &str,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<()> {
    if description.trim().is_empty() {
        return Err(ApiError::BadRequest("description is required".to_string()).into());
    }
    let photo = Photo::from_path(Path::new(photo_path))?;
    if !photo.mime.starts_with("image/") {
        return Err(ApiError::BadRequest(format!("{} is not an image", photo_path)).into());
    }
    let Some(token) = ctx.token() else {
        return Err(ApiError::Unauthorized.into());
    };

    let draft = StoryDraft {
        description,
        photo,
        lat,
        lon,
    };

    match ctx.api.add_story(token, &draft).await {
        Ok(message) => {
            if let Err(e) = forget_cached_listing(ctx) {
                log::warn!("Cached listing not evicted: {}", e);
            }
            if ctx.format == OutputFormat::Json {
                let json = serde_json::json!({ "status": "uploaded", "message": message.message });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                println!("{} Story shared. {}", "✓".green(), message.message.dimmed());
            }
            Ok(())
        }
        Err(Error::Api(e)) if e.is_retryable() => save_offline(ctx, &draft, &e).await,
        Err(e) => Err(e),
    }
}

async fn save_offline(ctx: &CommandContext, draft: &StoryDraft, cause: &ApiError) -> Result<()> {
    log::warn!("Upload failed, keeping the story on this device: {}", cause);

    let record = ctx
        .queue()
        .enqueue(draft)
        .await
        .map_err(|e| Error::Other(format!("Failed to save story locally: {}", e)))?;

    let registered = match ctx.registrations().register(SYNC_TAG).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Background sync not registered: {}", e);
            false
        }
    };

    if ctx.format == OutputFormat::Json {
        let json = serde_json::json!({
            "status": "saved_offline",
            "id": record.id,
            "sync_registered": registered,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{} Saved offline as {}", "💾".yellow(), record.id.bold());
    if registered {
        println!("  It will be uploaded on the next sync.");
    } else {
        println!("  → Run 'storykeep sync' once you are back online.");
    }
    Ok(())
}

/// Drop the cached listing so the next list shows the new story
fn forget_cached_listing(ctx: &CommandContext) -> Result<bool> {
    let worker = ctx.worker()?;
    Ok(worker.engine().evict(&listing_request(ctx)?)?)
}

/// Current server copy of the listing, or the cached one when the API
/// cannot be reached
async fn fresh_or_cached_stories(ctx: &CommandContext) -> Result<Vec<Story>> {
    match ctx.api.list_stories(ctx.token()).await {
        Ok(stories) => Ok(stories),
        Err(Error::Api(e)) if e.is_network() => {
            log::warn!("{}; looking in the cached listing", e);
            let _page = ctx.open_page();
            let worker = ctx.started_worker().await?;
            match load_stories(ctx, &worker).await? {
                Listing::Stories {
                    stories,
                    mut intercepted,
                    ..
                } => {
                    intercepted.settle().await;
                    Ok(stories)
                }
                Listing::Offline(reason) => {
                    Err(Error::Other(format!("Cannot load stories: {}", reason)))
                }
            }
        }
        Err(e) => Err(e),
    }
}

/// Keep a copy of a listed story for offline reading
pub async fn save(ctx: &CommandContext, id: &str) -> Result<()> {
    let stories = fresh_or_cached_stories(ctx).await?;
    let story = stories
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("story {}", id)))?;

    let queue = ctx.queue();
    let already = queue.is_saved(id).await?;
    let record = queue.save_story(story).await?;

    if ctx.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if already {
        println!("{} {} was already saved", "○".dimmed(), story.title());
    } else {
        println!("{} Saved {} for offline reading", "✓".green(), story.title());
    }
    Ok(())
}
