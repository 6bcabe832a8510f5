//! Remote story API client

use async_trait::async_trait;

use crate::error::Result;
use crate::store::StoryDraft;

#[cfg(test)]
pub mod mock;
pub mod models;
pub mod story_client;

#[cfg(test)]
pub use mock::MockStoryApi;
pub use models::{ApiMessage, Story, SubscriptionPayload};
pub use story_client::StoryClient;

/// Remote content and notification API
#[async_trait]
pub trait StoryApi: Send + Sync {
    /// List stories; the token is optional for the public listing
    async fn list_stories(&self, token: Option<&str>) -> Result<Vec<Story>>;

    /// Upload a story as a multipart form
    async fn add_story(&self, token: &str, story: &StoryDraft) -> Result<ApiMessage>;

    /// Register a push subscription with the server
    async fn subscribe_push(
        &self,
        token: &str,
        subscription: &SubscriptionPayload,
    ) -> Result<ApiMessage>;

    /// Remove a push subscription from the server
    async fn unsubscribe_push(
        &self,
        token: &str,
        subscription: &SubscriptionPayload,
    ) -> Result<ApiMessage>;
}
