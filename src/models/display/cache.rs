//! Cache statistics display model

use serde::Serialize;
use tabled::Tabled;

use super::common::format_size;
use crate::cache::storage::CacheStats;

/// One named cache in table/JSON output.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct CacheDisplay {
    #[tabled(rename = "NAME")]
    pub name: String,

    #[tabled(rename = "ENTRIES")]
    pub entries: usize,

    #[tabled(rename = "SIZE")]
    pub size: String,

    #[tabled(skip)]
    pub total_size_bytes: usize,

    #[tabled(rename = "NEWEST")]
    pub newest: String,
}

impl From<&CacheStats> for CacheDisplay {
    fn from(stats: &CacheStats) -> Self {
        let newest = stats
            .newest_entry
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|d| super::common::format_timestamp(&d))
            .unwrap_or_else(|| "-".to_string());

        Self {
            name: stats.name.clone(),
            entries: stats.entries,
            size: format_size(stats.total_size_bytes),
            total_size_bytes: stats.total_size_bytes,
            newest,
        }
    }
}
