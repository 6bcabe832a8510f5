//! Story display model

use serde::Serialize;
use tabled::Tabled;

use super::common::{format_location, format_timestamp, truncate_string};
use crate::client::Story;

/// Story display model for table/JSON output.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct StoryDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    /// Author
    #[tabled(rename = "NAME")]
    pub name: String,

    #[tabled(rename = "DESCRIPTION")]
    pub description: String,

    #[tabled(rename = "LOCATION")]
    pub location: String,

    #[tabled(rename = "CREATED")]
    pub created: String,

    /// Saved for offline reading
    #[tabled(rename = "SAVED")]
    pub saved: String,
}

impl StoryDisplay {
    /// Build a row, marking stories that are saved locally
    pub fn new(story: &Story, saved: bool) -> Self {
        Self {
            id: story.id.clone(),
            name: story.title().to_string(),
            description: truncate_string(&story.description, 48),
            location: if story.has_location() {
                format_location(story.lat, story.lon)
            } else {
                "-".to_string()
            },
            created: story
                .created_at
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
            saved: if saved { "✓".to_string() } else { String::new() },
        }
    }
}

impl From<&Story> for StoryDisplay {
    fn from(story: &Story) -> Self {
        Self::new(story, false)
    }
}
