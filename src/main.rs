//! storykeep - offline-first story sharing with a caching worker and
//! background sync

use clap::Parser;
use env_logger::Env;

mod bridge;
mod cache;
mod cli;
mod client;
mod config;
mod error;
mod models;
mod output;
mod push;
mod store;
mod sync;
mod worker;

use cli::{
    AuthCommands, CacheCommands, Cli, CommandContext, Commands, GlobalOptions, PushCommands,
    QueueCommands, StoryCommands, WorkerCommands,
};
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug
    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Version => {
            println!("storykeep version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Auth(auth_cmd) => match auth_cmd {
            AuthCommands::Login { token } => cli::auth::login(&opts, token).await,
            AuthCommands::Logout => cli::auth::logout(&opts),
        },
        command => {
            let ctx = CommandContext::new(&opts)?;
            dispatch(&ctx, command).await
        }
    }
}

async fn dispatch(ctx: &CommandContext, command: Commands) -> Result<()> {
    match command {
        Commands::Status => cli::status::run(ctx).await,
        Commands::Worker(worker_cmd) => match worker_cmd {
            WorkerCommands::Install => cli::worker::install(ctx).await,
            WorkerCommands::Activate => cli::worker::activate(ctx).await,
            WorkerCommands::Fetch { url, body } => cli::worker::fetch(ctx, &url, body).await,
        },
        Commands::Story(story_cmd) => match story_cmd {
            StoryCommands::List => cli::story::list(ctx).await,
            StoryCommands::Add {
                description,
                photo,
                lat,
                lon,
            } => cli::story::add(ctx, description, &photo, lat, lon).await,
            StoryCommands::Save { id } => cli::story::save(ctx, &id).await,
        },
        Commands::Queue(queue_cmd) => match queue_cmd {
            QueueCommands::List => cli::queue::list(ctx).await,
            QueueCommands::Delete { id } => cli::queue::delete(ctx, &id).await,
        },
        Commands::Sync { no_page } => cli::sync::run(ctx, no_page).await,
        Commands::Push(push_cmd) => match push_cmd {
            PushCommands::Status => cli::push::status(ctx).await,
            PushCommands::Subscribe => cli::push::subscribe(ctx).await,
            PushCommands::Unsubscribe => cli::push::unsubscribe(ctx).await,
            PushCommands::Receive { payload } => {
                cli::push::receive(ctx, payload.as_deref()).await
            }
            PushCommands::Click => cli::push::click(ctx).await,
        },
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(ctx),
            CacheCommands::Clear => cli::cache::clear(ctx),
            CacheCommands::Path => cli::cache::path(ctx),
        },
        // Handled before a context is built
        Commands::Version | Commands::Auth(_) => Ok(()),
    }
}
