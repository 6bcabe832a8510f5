//! Display models for CLI output
//!
//! Converts stories, queued records and cache statistics into table rows
//! and JSON objects.

pub mod display;

pub use display::{CacheDisplay, RecordDisplay, StoryDisplay};
