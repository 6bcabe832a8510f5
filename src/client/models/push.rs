//! Push subscription payloads sent to the notification endpoint

use serde::{Deserialize, Serialize};

/// Key material of a push subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Subscription as the API expects it: endpoint and keys only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPayload {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = SubscriptionPayload {
            endpoint: "https://push.example.org/abc".to_string(),
            keys: SubscriptionKeys {
                p256dh: "BPk".to_string(),
                auth: "xyz".to_string(),
            },
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["endpoint"], "https://push.example.org/abc");
        assert_eq!(json["keys"]["p256dh"], "BPk");
        assert!(json.get("expirationTime").is_none());
    }
}
