//! Story listing models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical story as read from the listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStory", rename_all = "camelCase")]
pub struct Story {
    pub id: String,

    /// Author name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Story {
    pub fn has_location(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Title shown for the story
    pub fn title(&self) -> &str {
        self.name.as_deref().unwrap_or("Story")
    }
}

/// Listing envelope: `{error, message, listStory}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoriesResponse {
    #[serde(default)]
    pub error: bool,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub list_story: Vec<Story>,
}

/// Ids arrive as strings or numbers depending on the backend
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawLocation {
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Every field name a story has been seen with
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStory {
    id: Option<RawId>,
    #[serde(rename = "_id")]
    underscore_id: Option<RawId>,
    key: Option<RawId>,

    name: Option<String>,
    title: Option<String>,

    description: Option<String>,
    desc: Option<String>,

    photo_url: Option<String>,
    photo: Option<String>,
    picture_url: Option<String>,

    created_at: Option<String>,

    lat: Option<f64>,
    latitude: Option<f64>,
    lon: Option<f64>,
    longitude: Option<f64>,
    location: Option<RawLocation>,
}

impl From<RawStory> for Story {
    fn from(raw: RawStory) -> Self {
        let id = raw
            .id
            .or(raw.underscore_id)
            .or(raw.key)
            .map(RawId::into_string)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generated_id);

        let location = raw.location.unwrap_or_default();
        let created_at = raw
            .created_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        Story {
            id,
            name: raw.name.or(raw.title),
            description: raw.description.or(raw.desc).unwrap_or_default(),
            photo_url: raw.photo_url.or(raw.photo).or(raw.picture_url),
            created_at,
            lat: raw.lat.or(raw.latitude).or(location.lat),
            lon: raw.lon.or(raw.longitude).or(location.lon),
        }
    }
}

/// Stand-in id for stories the backend sent without one
fn generated_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..7].to_string()
}
