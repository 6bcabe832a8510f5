//! Notifications shown for incoming push messages

use async_trait::async_trait;
use colored::Colorize;
use serde::{Deserialize, Serialize};

const GENERIC_TITLE: &str = "New story";
const GENERIC_BODY: &str = "Someone just shared a new story.";

/// A notification ready to be shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Deserialize)]
struct PayloadOptions {
    body: Option<String>,
    icon: Option<String>,
}

/// Accepted payload shapes: `{title, body}` or `{title, options: {body}}`
#[derive(Deserialize)]
struct Payload {
    title: Option<String>,
    body: Option<String>,
    icon: Option<String>,
    options: Option<PayloadOptions>,
}

impl Notification {
    /// Fallback for push messages without a usable payload
    pub fn generic() -> Self {
        Self {
            title: GENERIC_TITLE.to_string(),
            body: GENERIC_BODY.to_string(),
            icon: None,
        }
    }

    /// Build the notification for a push payload; never fails
    pub fn from_payload(data: Option<&[u8]>) -> Self {
        let Some(data) = data.filter(|d| !d.is_empty()) else {
            return Self::generic();
        };

        let payload: Payload = match serde_json::from_slice(data) {
            Ok(payload) => payload,
            Err(e) => {
                log::debug!("Unparsable push payload: {}", e);
                return Self::generic();
            }
        };

        let (options_body, options_icon) = match payload.options {
            Some(options) => (options.body, options.icon),
            None => (None, None),
        };

        let title = payload.title.filter(|t| !t.trim().is_empty());
        let body = payload.body.or(options_body);
        if title.is_none() && body.is_none() {
            return Self::generic();
        }

        Self {
            title: title.unwrap_or_else(|| GENERIC_TITLE.to_string()),
            body: body.unwrap_or_default(),
            icon: payload.icon.or(options_icon),
        }
    }
}

/// Where notifications are displayed
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification);
}

/// Prints notifications to the terminal
pub struct TerminalNotifier;

#[async_trait]
impl Notifier for TerminalNotifier {
    async fn show(&self, notification: &Notification) {
        println!("{} {}", "🔔".yellow(), notification.title.bold());
        if !notification.body.is_empty() {
            println!("   {}", notification.body);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_and_body() {
        let n = Notification::from_payload(Some(br#"{"title":"Hi","body":"there"}"#));
        assert_eq!(n.title, "Hi");
        assert_eq!(n.body, "there");
    }

    #[test]
    fn test_title_and_options_body() {
        let payload = br#"{"title":"Story berhasil dibuat","options":{"body":"Anda telah membuat story baru"}}"#;
        let n = Notification::from_payload(Some(payload));
        assert_eq!(n.title, "Story berhasil dibuat");
        assert_eq!(n.body, "Anda telah membuat story baru");
    }

    #[test]
    fn test_missing_payload_is_generic() {
        assert_eq!(Notification::from_payload(None), Notification::generic());
        assert_eq!(Notification::from_payload(Some(b"")), Notification::generic());
    }

    #[test]
    fn test_unparsable_payload_is_generic() {
        assert_eq!(
            Notification::from_payload(Some(b"plain text push")),
            Notification::generic()
        );
        assert_eq!(
            Notification::from_payload(Some(b"{}")),
            Notification::generic()
        );
    }

    #[test]
    fn test_body_without_title_keeps_body() {
        let n = Notification::from_payload(Some(br#"{"body":"only body"}"#));
        assert_eq!(n.title, GENERIC_TITLE);
        assert_eq!(n.body, "only body");
    }
}
