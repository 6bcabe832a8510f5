//! Mock story API for testing
//!
//! Provides a mock implementation of [`StoryApi`] for unit testing without
//! making real API calls.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::StoryApi;
use super::models::{ApiMessage, Story, SubscriptionPayload};
use crate::error::{ApiError, Result};
use crate::store::StoryDraft;

/// Mock API client for testing.
///
/// Configure expected responses via builder methods, then use in tests.
#[derive(Clone, Default)]
pub struct MockStoryApi {
    /// Stories to return from list_stories
    stories: Arc<Mutex<Vec<Story>>>,
    /// Uploads whose description matches fail with a server error
    failing_descriptions: Arc<Mutex<HashSet<String>>>,
    /// Error to return (if any) - consumed on first use
    error: Arc<Mutex<Option<ApiError>>>,
    /// Track number of calls for verification
    call_count: Arc<Mutex<CallCounts>>,
    /// Captured requests for test assertions
    captured_requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// Tracks API call counts for test verification
#[derive(Default, Debug, Clone)]
pub struct CallCounts {
    pub list_stories: usize,
    pub add_story: usize,
    pub subscribe_push: usize,
    pub unsubscribe_push: usize,
}

impl CallCounts {
    /// Get total number of API calls made.
    pub fn total(&self) -> usize {
        self.list_stories + self.add_story + self.subscribe_push + self.unsubscribe_push
    }
}

/// A captured API request for test assertions.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// The API method called (e.g., "add_story")
    pub method: String,
    /// Bearer token sent with the request
    pub token: Option<String>,
    /// Story description for uploads
    pub description: Option<String>,
    /// Photo bytes for uploads
    pub photo: Option<Vec<u8>>,
    /// Subscription endpoint for push calls
    pub endpoint: Option<String>,
}

impl CapturedRequest {
    fn new(method: &str, token: Option<&str>) -> Self {
        Self {
            method: method.to_string(),
            token: token.map(str::to_string),
            description: None,
            photo: None,
            endpoint: None,
        }
    }
}

impl MockStoryApi {
    /// Create a new mock client with default (empty) responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure stories to return from list_stories.
    pub async fn with_stories(self, stories: Vec<Story>) -> Self {
        *self.stories.lock().await = stories;
        self
    }

    /// Make uploads with this description fail with a server error.
    pub async fn failing_upload(self, description: &str) -> Self {
        self.failing_descriptions
            .lock()
            .await
            .insert(description.to_string());
        self
    }

    /// Configure an error to return on the next API call.
    /// The error is consumed after one use.
    pub async fn with_error(self, error: ApiError) -> Self {
        *self.error.lock().await = Some(error);
        self
    }

    /// Get the call counts for verification in tests.
    pub async fn call_counts(&self) -> CallCounts {
        self.call_count.lock().await.clone()
    }

    /// Get all captured requests for test assertions.
    pub async fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.captured_requests.lock().await.clone()
    }

    /// Check if there's a pending error and consume it.
    async fn check_error(&self) -> Result<()> {
        let mut error = self.error.lock().await;
        if let Some(e) = error.take() {
            return Err(e.into());
        }
        Ok(())
    }

    async fn capture(&self, request: CapturedRequest) {
        self.captured_requests.lock().await.push(request);
    }
}

#[async_trait]
impl StoryApi for MockStoryApi {
    async fn list_stories(&self, token: Option<&str>) -> Result<Vec<Story>> {
        self.call_count.lock().await.list_stories += 1;
        self.capture(CapturedRequest::new("list_stories", token)).await;
        self.check_error().await?;
        Ok(self.stories.lock().await.clone())
    }

    async fn add_story(&self, token: &str, story: &StoryDraft) -> Result<ApiMessage> {
        self.call_count.lock().await.add_story += 1;
        let mut request = CapturedRequest::new("add_story", Some(token));
        request.description = Some(story.description.clone());
        request.photo = Some(story.photo.bytes.clone());
        self.capture(request).await;

        self.check_error().await?;
        if self
            .failing_descriptions
            .lock()
            .await
            .contains(&story.description)
        {
            return Err(ApiError::ServerError("upload rejected".to_string()).into());
        }
        Ok(ApiMessage::ok("Story created successfully"))
    }

    async fn subscribe_push(
        &self,
        token: &str,
        subscription: &SubscriptionPayload,
    ) -> Result<ApiMessage> {
        self.call_count.lock().await.subscribe_push += 1;
        let mut request = CapturedRequest::new("subscribe_push", Some(token));
        request.endpoint = Some(subscription.endpoint.clone());
        self.capture(request).await;

        self.check_error().await?;
        Ok(ApiMessage::ok("Success to subscribe web push notification."))
    }

    async fn unsubscribe_push(
        &self,
        token: &str,
        subscription: &SubscriptionPayload,
    ) -> Result<ApiMessage> {
        self.call_count.lock().await.unsubscribe_push += 1;
        let mut request = CapturedRequest::new("unsubscribe_push", Some(token));
        request.endpoint = Some(subscription.endpoint.clone());
        self.capture(request).await;

        self.check_error().await?;
        Ok(ApiMessage::ok("Success to unsubscribe web push notification."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Photo;

    fn draft(description: &str) -> StoryDraft {
        StoryDraft {
            description: description.to_string(),
            photo: Photo {
                mime: "image/png".to_string(),
                bytes: vec![7, 7, 7],
            },
            lat: None,
            lon: None,
        }
    }

    #[tokio::test]
    async fn test_mock_client_default_empty() {
        let mock = MockStoryApi::new();
        assert!(mock.list_stories(None).await.unwrap().is_empty());
        assert_eq!(mock.call_counts().await.list_stories, 1);
    }

    #[tokio::test]
    async fn test_mock_client_with_error() {
        let mock = MockStoryApi::new()
            .with_error(ApiError::Network("offline".to_string()))
            .await;

        assert!(mock.list_stories(None).await.is_err());
        // Error is consumed
        assert!(mock.list_stories(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_client_failing_upload() {
        let mock = MockStoryApi::new().failing_upload("bad").await;

        assert!(mock.add_story("tok", &draft("bad")).await.is_err());
        assert!(mock.add_story("tok", &draft("good")).await.is_ok());
        assert_eq!(mock.call_counts().await.total(), 2);
    }

    #[tokio::test]
    async fn test_mock_client_captured_requests() {
        let mock = MockStoryApi::new();
        mock.add_story("tok-1", &draft("captured")).await.unwrap();

        let requests = mock.captured_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "add_story");
        assert_eq!(requests[0].token.as_deref(), Some("tok-1"));
        assert_eq!(requests[0].photo.as_deref(), Some(&[7u8, 7, 7][..]));
    }
}
