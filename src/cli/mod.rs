//! CLI command definitions and handlers

use clap::{Parser, Subcommand};

pub mod args;
pub mod auth;
pub mod cache;
pub mod context;
pub mod push;
pub mod queue;
pub mod status;
pub mod story;
pub mod sync;
pub mod worker;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

/// storykeep - offline-first story sharing from the terminal
#[derive(Parser, Debug)]
#[command(name = "storykeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "STORYKEEP_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "STORYKEEP_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override data directory (story store, caches, push state)
    #[arg(long, global = true, env = "STORYKEEP_DATA_DIR", hide_env = true)]
    pub data_dir: Option<String>,

    /// Override the story API base URL
    #[arg(long, global = true, env = "STORYKEEP_API_URL", hide_env = true)]
    pub api_url: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "STORYKEEP_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show credential, worker, queue and push status
    Status,

    /// Display version information
    Version,

    /// Store or forget the session token
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Drive the caching worker
    #[command(subcommand)]
    Worker(WorkerCommands),

    /// List, share and save stories
    #[command(subcommand)]
    Story(StoryCommands),

    /// Stories kept on this device
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Upload stories written while offline
    #[command(after_help = "\
Runs every pending background sync. The token is requested from an open
page; with --no-page nobody can answer and the queue is left untouched.")]
    Sync {
        /// Do not open a page to answer the token request
        #[arg(long)]
        no_page: bool,
    },

    /// Push notification subscription
    #[command(subcommand)]
    Push(PushCommands),

    /// Manage the worker's response caches
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Session token subcommands
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Save a token (prompted when --token is omitted)
    Login {
        /// Bearer token issued by the story API
        #[arg(long, env = "STORYKEEP_TOKEN", hide_env = true)]
        token: Option<String>,
    },
    /// Remove the stored token
    Logout,
}

/// Worker lifecycle subcommands
#[derive(Subcommand, Debug)]
pub enum WorkerCommands {
    /// Precache the application shell into the current generation
    Install,
    /// Delete old cache generations and take control of pages
    Activate,
    /// Send a GET request through the worker
    Fetch {
        /// Absolute URL to request
        url: String,

        /// Print the response body
        #[arg(long)]
        body: bool,
    },
}

/// Story subcommands
#[derive(Subcommand, Debug)]
pub enum StoryCommands {
    /// List stories (served from cache when offline)
    List,
    /// Share a new story; saved offline when the API is unreachable
    Add {
        /// Story text
        #[arg(long, short = 'd')]
        description: String,

        /// Image file to attach
        #[arg(long, short = 'p')]
        photo: String,

        /// Latitude of the story location
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude of the story location
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },
    /// Keep a copy of a listed story on this device
    Save {
        /// Story ID from `storykeep story list`
        id: String,
    },
}

/// Local queue subcommands
#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List saved and un-synced stories
    List,
    /// Remove a story from this device
    Delete {
        /// Story ID
        id: String,
    },
}

/// Push notification subcommands
#[derive(Subcommand, Debug)]
pub enum PushCommands {
    /// Show support, permission and subscription
    Status,
    /// Subscribe and register with the story API
    Subscribe,
    /// Unregister from the story API and drop the subscription
    Unsubscribe,
    /// Handle an incoming push message
    Receive {
        /// Push payload (JSON)
        #[arg(long)]
        payload: Option<String>,
    },
    /// Handle a click on the last notification
    Click,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,
    /// Clear all cached data
    Clear,
    /// Print cache directory path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_story_add() {
        let cli = Cli::try_parse_from([
            "storykeep",
            "story",
            "add",
            "--description",
            "hello",
            "--photo",
            "cat.jpg",
            "--lat",
            "-6.2",
            "--lon",
            "106.8",
        ])
        .unwrap();

        match cli.command {
            Commands::Story(StoryCommands::Add { lat, lon, .. }) => {
                assert_eq!(lat, Some(-6.2));
                assert_eq!(lon, Some(106.8));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_lat_requires_lon() {
        let result = Cli::try_parse_from([
            "storykeep", "story", "add", "-d", "x", "-p", "y", "--lat", "1.0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "storykeep",
            "queue",
            "list",
            "--format",
            "json",
            "--data-dir",
            "/tmp/sk",
        ])
        .unwrap();

        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/sk"));
    }

    #[test]
    fn test_sync_no_page_flag() {
        let cli = Cli::try_parse_from(["storykeep", "sync", "--no-page"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { no_page: true }));
    }
}
