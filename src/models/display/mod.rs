//! Display model implementations for table and JSON output

mod cache;
mod common;
mod record;
mod story;

pub use cache::CacheDisplay;
pub use common::format_size;
pub use record::RecordDisplay;
pub use story::StoryDisplay;
