//! Story API data models
//!
//! Raw API objects are normalized at this boundary; the rest of the crate
//! only sees the canonical shapes re-exported here.

mod message;
mod push;
mod story;

pub use message::ApiMessage;
pub use push::{SubscriptionKeys, SubscriptionPayload};
pub use story::{Story, StoriesResponse};
