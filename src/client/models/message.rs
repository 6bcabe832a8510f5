//! Generic API acknowledgement

use serde::{Deserialize, Serialize};

/// `{error, message}` envelope returned by write endpoints and error bodies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub error: bool,

    #[serde(default)]
    pub message: String,
}

impl ApiMessage {
    #[cfg(test)]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
        }
    }
}
