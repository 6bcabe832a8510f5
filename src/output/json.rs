//! JSON output formatting

use chrono::Utc;
use serde::Serialize;

/// Wrapper for JSON output with metadata
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    /// The actual data
    pub data: T,

    /// Metadata about the response
    pub meta: Metadata,
}

/// Metadata included in JSON output
#[derive(Debug, Serialize)]
pub struct Metadata {
    /// Timestamp of the response
    pub timestamp: String,

    /// CLI version
    pub version: String,

    /// Where the data came from (cache, network, offline shell)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl<T> JsonOutput<T> {
    /// Create a new JSON output with metadata
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                source: None,
            },
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}

/// Format data as pretty-printed JSON
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    let output = JsonOutput::new(data);
    serde_json::to_string_pretty(&output)
}

/// Format data as pretty-printed JSON, recording where it came from
pub fn format_json_from<T: Serialize + ?Sized>(
    data: &T,
    source: &str,
) -> Result<String, serde_json::Error> {
    let output = JsonOutput::new(data).with_source(source);
    serde_json::to_string_pretty(&output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Clone)]
    struct QueuedItem {
        id: String,
        synced: bool,
    }

    #[test]
    fn test_json_output_new() {
        let output = JsonOutput::new(vec!["story-1", "story-2"]);

        assert_eq!(output.data, vec!["story-1", "story-2"]);
        assert_eq!(output.meta.version, env!("CARGO_PKG_VERSION"));
        assert!(!output.meta.timestamp.is_empty());
        assert!(output.meta.source.is_none());
    }

    #[test]
    fn test_format_json_basic() {
        let items = vec![QueuedItem {
            id: "temp-1".to_string(),
            synced: false,
        }];

        let result = format_json(&items).unwrap();

        assert!(result.contains("\"data\""));
        assert!(result.contains("\"meta\""));
        assert!(result.contains("\"id\": \"temp-1\""));
        assert!(result.contains("\"synced\": false"));
        assert!(!result.contains("\"source\""));
    }

    #[test]
    fn test_format_json_empty_vec() {
        let items: Vec<QueuedItem> = vec![];
        let result = format_json(&items).unwrap();

        assert!(result.contains("\"data\": []"));
    }

    #[test]
    fn test_format_json_with_source() {
        let result = format_json_from(&vec!["story-1"], "cache").unwrap();

        assert!(result.contains("\"source\": \"cache\""));
    }
}
