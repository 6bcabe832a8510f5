//! Offline story records and their photo payloads

use std::path::Path;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::models::Story;
use crate::error::StoreError;

/// A story kept on the device.
///
/// `synced == false` means the story exists only here and is waiting for
/// upload. `synced == true` means it mirrors a story the server already has
/// (saved for offline reading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineStoryRecord {
    pub id: String,
    pub description: String,
    /// Photo as a base64 data URL (offline-authored stories)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    /// Remote photo (saved server stories)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub synced: bool,
}

/// What the user filled into the add-story form
#[derive(Debug, Clone)]
pub struct StoryDraft {
    pub description: String,
    pub photo: Photo,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Binary image with its content type
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Photo {
    /// Read an image file, guessing its content type from the extension
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self { mime, bytes })
    }

    /// Encode as `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// Decode a data URL produced by [`Photo::to_data_url`]
    pub fn from_data_url(data_url: &str) -> Result<Self, StoreError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| StoreError::InvalidRecord("photo is not a data URL".to_string()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| StoreError::InvalidRecord("photo data URL has no payload".to_string()))?;
        let mime = meta
            .strip_suffix(";base64")
            .ok_or_else(|| StoreError::InvalidRecord("photo data URL is not base64".to_string()))?;

        let bytes = general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| StoreError::InvalidRecord(format!("photo payload: {}", e)))?;

        let mime = if mime.is_empty() {
            "application/octet-stream"
        } else {
            mime
        };
        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// File name used for the multipart part
    pub fn file_name(&self) -> String {
        let ext = mime_guess::get_mime_extensions_str(&self.mime)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        format!("photo.{}", ext)
    }
}

/// Client-generated id for stories the server has not seen yet
pub fn temp_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("temp-{}-{}", Utc::now().timestamp_millis(), &suffix[..7])
}

impl OfflineStoryRecord {
    /// Build a local-only record from a draft, fully, before it is stored
    pub fn from_draft(draft: &StoryDraft) -> Result<Self, StoreError> {
        if draft.description.trim().is_empty() {
            return Err(StoreError::InvalidRecord(
                "description is required".to_string(),
            ));
        }
        if draft.photo.bytes.is_empty() {
            return Err(StoreError::InvalidRecord("photo is empty".to_string()));
        }

        Ok(Self {
            id: temp_id(),
            description: draft.description.clone(),
            photo: Some(draft.photo.to_data_url()),
            photo_url: None,
            name: None,
            lat: draft.lat,
            lon: draft.lon,
            created_at: Utc::now(),
            saved_at: None,
            synced: false,
        })
    }

    /// Mirror a server story for offline reading
    pub fn from_story(story: &Story) -> Self {
        Self {
            id: story.id.clone(),
            description: story.description.clone(),
            photo: None,
            photo_url: story.photo_url.clone(),
            name: story.name.clone(),
            lat: story.lat,
            lon: story.lon,
            created_at: story.created_at.unwrap_or_else(Utc::now),
            saved_at: Some(Utc::now()),
            synced: true,
        }
    }

    /// Decode the stored photo payload, if any
    pub fn decoded_photo(&self) -> Result<Option<Photo>, StoreError> {
        self.photo.as_deref().map(Photo::from_data_url).transpose()
    }

    /// Rebuild the upload form of an offline-authored record
    pub fn to_draft(&self) -> Result<StoryDraft, StoreError> {
        let photo = self.decoded_photo()?.ok_or_else(|| {
            StoreError::InvalidRecord(format!("record {} has no photo", self.id))
        })?;
        Ok(StoryDraft {
            description: self.description.clone(),
            photo,
            lat: self.lat,
            lon: self.lon,
        })
    }

    pub fn is_temporary(&self) -> bool {
        self.id.starts_with("temp-")
    }
}
