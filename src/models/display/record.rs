//! Offline record display model

use serde::Serialize;
use tabled::Tabled;

use super::common::{format_location, format_timestamp, truncate_string};
use crate::store::OfflineStoryRecord;

/// Queue entry display model for table/JSON output.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct RecordDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "DESCRIPTION")]
    pub description: String,

    #[tabled(rename = "LOCATION")]
    pub location: String,

    /// UN-SYNCED (waiting for upload) or SAVED (offline copy)
    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "CREATED")]
    pub created: String,
}

impl From<&OfflineStoryRecord> for RecordDisplay {
    fn from(record: &OfflineStoryRecord) -> Self {
        Self {
            id: record.id.clone(),
            description: truncate_string(&record.description, 48),
            location: format_location(record.lat, record.lon),
            status: if record.synced { "SAVED" } else { "UN-SYNCED" }.to_string(),
            created: format_timestamp(&record.created_at),
        }
    }
}
