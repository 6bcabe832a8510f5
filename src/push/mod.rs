//! Push subscription management
//!
//! The page side decides whether the user can subscribe and keeps the
//! server's registration in step with the platform subscription. The worker
//! side turns incoming push messages into notifications.

pub mod notification;
pub mod platform;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::StoryApi;
use crate::client::models::{SubscriptionKeys, SubscriptionPayload};
use crate::error::{Error, PushError};

pub use notification::{Notification, Notifier, TerminalNotifier};
pub use platform::{FilePushPlatform, Permission, PushPlatform, decode_vapid_key};

/// Subscription as the platform hands it out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}

impl PushSubscription {
    /// What the API accepts: `expirationTime` is dropped
    pub fn to_payload(&self) -> SubscriptionPayload {
        SubscriptionPayload {
            endpoint: self.endpoint.clone(),
            keys: self.keys.clone(),
        }
    }
}

/// Page-side push subscription manager
pub struct PushManager<A: StoryApi, P: PushPlatform> {
    api: Arc<A>,
    platform: Arc<P>,
    vapid_public_key: Option<String>,
}

impl<A: StoryApi, P: PushPlatform> PushManager<A, P> {
    pub fn new(api: Arc<A>, platform: Arc<P>, vapid_public_key: Option<String>) -> Self {
        Self {
            api,
            platform,
            vapid_public_key: vapid_public_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Current subscription; `None` when unsupported or unreadable
    pub async fn get_subscription(&self) -> Option<PushSubscription> {
        if !self.platform.supports_push() {
            return None;
        }
        match self.platform.get_subscription().await {
            Ok(subscription) => subscription,
            Err(e) => {
                log::warn!("Could not read push subscription: {}", e);
                None
            }
        }
    }

    pub async fn permission(&self) -> Permission {
        self.platform.permission().await
    }

    /// Subscribe and register the subscription with the server
    ///
    /// Checks run in a fixed order: platform support, login, permission.
    /// An existing subscription is reused. A server failure is returned as
    /// is and the local subscription is kept.
    pub async fn subscribe(&self, token: Option<&str>) -> Result<PushSubscription, PushError> {
        if !self.platform.supports_push() {
            return Err(PushError::Unsupported(
                "no push service is configured".to_string(),
            ));
        }
        let Some(vapid_key) = self.vapid_public_key.as_deref() else {
            return Err(PushError::Unsupported(
                "no VAPID public key is configured".to_string(),
            ));
        };

        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            return Err(PushError::NotLoggedIn);
        };

        let permission = match self.platform.permission().await {
            Permission::Default => self.platform.request_permission().await?,
            decided => decided,
        };
        if permission != Permission::Granted {
            return Err(PushError::PermissionDenied);
        }

        let subscription = match self.platform.get_subscription().await? {
            Some(existing) => {
                log::debug!("Reusing push subscription {}", existing.endpoint);
                existing
            }
            None => {
                let key = decode_vapid_key(vapid_key)?;
                self.platform.subscribe(&key).await?
            }
        };

        self.api
            .subscribe_push(token, &subscription.to_payload())
            .await
            .map_err(server_error)?;

        Ok(subscription)
    }

    /// Unregister on the server first, then drop the local subscription
    ///
    /// Returns `Ok(false)` when there was nothing to unsubscribe.
    pub async fn unsubscribe(&self, token: Option<&str>) -> Result<bool, PushError> {
        let Some(subscription) = self.get_subscription().await else {
            return Ok(false);
        };
        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            return Err(PushError::NotLoggedIn);
        };

        self.api
            .unsubscribe_push(token, &subscription.to_payload())
            .await
            .map_err(server_error)?;

        if !self.platform.unsubscribe().await? {
            return Err(PushError::Platform(
                "Local unsubscribe failed".to_string(),
            ));
        }
        Ok(true)
    }
}

fn server_error(err: Error) -> PushError {
    match err {
        Error::Api(api) => PushError::Server(api),
        other => PushError::Platform(other.to_string()),
    }
}
