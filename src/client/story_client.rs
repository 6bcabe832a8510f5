//! Story API client implementation

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::StoryApi;
use super::models::{ApiMessage, StoriesResponse, Story, SubscriptionPayload};
use crate::error::{ApiError, Result};
use crate::store::StoryDraft;

/// Rate limit: 360 requests per minute (6 per second)
const RATE_LIMIT_PER_SECOND: NonZeroU32 = match NonZeroU32::new(6) {
    Some(n) => n,
    None => unreachable!(),
};

/// Story API client
pub struct StoryClient {
    http: HttpClient,
    base_url: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl StoryClient {
    /// Create a client against `base_url` (e.g. `https://host/v1`)
    pub fn new(base_url: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota = Quota::per_second(RATE_LIMIT_PER_SECOND);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a prepared request and map the response status
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        // Apply rate limiting
        self.rate_limiter.until_ready().await;

        let response = request.send().await.map_err(ApiError::from)?;

        let status = response.status();
        log::debug!("{} {}", status.as_u16(), response.url());

        match status {
            status if status.is_success() => {
                let data = response.json::<T>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                Ok(data)
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized.into()),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden.into()),
            StatusCode::NOT_FOUND => {
                let error_msg = error_message(response, "Resource not found").await;
                Err(ApiError::NotFound(error_msg).into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimit(Duration::from_secs(retry_after)).into())
            }
            StatusCode::BAD_REQUEST
            | StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::UNPROCESSABLE_ENTITY => {
                let error_msg = error_message(response, "Bad request").await;
                Err(ApiError::BadRequest(error_msg).into())
            }
            status if status.is_server_error() => {
                let fallback = format!("Server error: {}", status);
                let error_msg = error_message(response, &fallback).await;
                Err(ApiError::ServerError(error_msg).into())
            }
            _ => {
                let error_msg = format!("Unexpected status code: {}", status);
                Err(ApiError::InvalidResponse(error_msg).into())
            }
        }
    }

    fn subscription_request(
        &self,
        method: reqwest::Method,
        token: &str,
        subscription: &SubscriptionPayload,
    ) -> RequestBuilder {
        self.http
            .request(method, self.url("/notifications/subscribe"))
            .bearer_auth(token)
            .json(subscription)
    }
}

/// Prefer the `message` field of an error body, then the raw text
async fn error_message(response: reqwest::Response, fallback: &str) -> String {
    let text = match response.text().await {
        Ok(text) if !text.trim().is_empty() => text,
        _ => return fallback.to_string(),
    };
    match serde_json::from_str::<ApiMessage>(&text) {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => text,
    }
}

/// Multipart form for a story upload
fn story_form(story: &StoryDraft) -> Result<Form> {
    let photo = Part::bytes(story.photo.bytes.clone())
        .file_name(story.photo.file_name())
        .mime_str(&story.photo.mime)
        .map_err(|e| ApiError::BadRequest(format!("Invalid photo type: {}", e)))?;

    let mut form = Form::new()
        .text("description", story.description.clone())
        .part("photo", photo);

    if let Some(lat) = story.lat {
        form = form.text("lat", lat.to_string());
    }
    if let Some(lon) = story.lon {
        form = form.text("lon", lon.to_string());
    }
    Ok(form)
}

#[async_trait]
impl StoryApi for StoryClient {
    async fn list_stories(&self, token: Option<&str>) -> Result<Vec<Story>> {
        let mut request = self.http.get(self.url("/stories"));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response: StoriesResponse = self.send(request).await?;
        if response.error {
            return Err(ApiError::InvalidResponse(response.message).into());
        }
        Ok(response.list_story)
    }

    async fn add_story(&self, token: &str, story: &StoryDraft) -> Result<ApiMessage> {
        let request = self
            .http
            .post(self.url("/stories"))
            .bearer_auth(token)
            .multipart(story_form(story)?);

        self.send(request).await
    }

    async fn subscribe_push(
        &self,
        token: &str,
        subscription: &SubscriptionPayload,
    ) -> Result<ApiMessage> {
        let request = self.subscription_request(reqwest::Method::POST, token, subscription);
        self.send(request).await
    }

    async fn unsubscribe_push(
        &self,
        token: &str,
        subscription: &SubscriptionPayload,
    ) -> Result<ApiMessage> {
        let request = self.subscription_request(reqwest::Method::DELETE, token, subscription);
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Photo;

    #[test]
    fn test_client_creation() {
        let client = StoryClient::new("https://story-api.dicoding.dev/v1/");
        assert!(client.is_ok());
        assert_eq!(
            client.unwrap().base_url(),
            "https://story-api.dicoding.dev/v1"
        );
    }

    #[test]
    fn test_story_form_accepts_image() {
        let draft = StoryDraft {
            description: "hello".to_string(),
            photo: Photo {
                mime: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            },
            lat: Some(1.0),
            lon: Some(2.0),
        };
        assert!(story_form(&draft).is_ok());
    }

    #[test]
    fn test_story_form_rejects_bad_mime() {
        let draft = StoryDraft {
            description: "hello".to_string(),
            photo: Photo {
                mime: "not a mime".to_string(),
                bytes: vec![1],
            },
            lat: None,
            lon: None,
        };
        assert!(story_form(&draft).is_err());
    }

    #[cfg_attr(not(feature = "http-tests"), ignore)]
    #[tokio::test]
    async fn test_list_stories_against_server() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/stories")
            .with_status(200)
            .with_body(r#"{"error":false,"message":"ok","listStory":[{"id":"s1","description":"a"}]}"#)
            .create_async()
            .await;

        let client = StoryClient::new(&format!("{}/v1", server.url())).unwrap();
        let stories = client.list_stories(None).await.unwrap();

        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].id, "s1");
    }

    #[cfg_attr(not(feature = "http-tests"), ignore)]
    #[tokio::test]
    async fn test_status_mapping_uses_message_field() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/stories")
            .with_status(413)
            .with_body(r#"{"error":true,"message":"Payload content length greater than maximum allowed"}"#)
            .create_async()
            .await;

        let client = StoryClient::new(&format!("{}/v1", server.url())).unwrap();
        let draft = StoryDraft {
            description: "big".to_string(),
            photo: Photo {
                mime: "image/jpeg".to_string(),
                bytes: vec![0; 16],
            },
            lat: None,
            lon: None,
        };

        let err = client.add_story("tok", &draft).await.unwrap_err();
        match err {
            crate::error::Error::Api(ApiError::BadRequest(msg)) => {
                assert!(msg.contains("greater than maximum"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg_attr(not(feature = "http-tests"), ignore)]
    #[tokio::test]
    async fn test_unauthorized_upload() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/stories")
            .with_status(401)
            .create_async()
            .await;

        let client = StoryClient::new(&format!("{}/v1", server.url())).unwrap();
        let draft = StoryDraft {
            description: "x".to_string(),
            photo: Photo {
                mime: "image/jpeg".to_string(),
                bytes: vec![1],
            },
            lat: None,
            lon: None,
        };

        let err = client.add_story("expired", &draft).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Api(ApiError::Unauthorized)));
    }
}
