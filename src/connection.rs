//! Transport abstraction for the TF client
//!
//! The client only needs two primitives from the middleware bridge: a
//! request/response service call and a publish/subscribe topic. Any transport
//! (zenoh, a websocket bridge, an in-process fake) can back the client by
//! implementing [`Connection`].

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Live subscription to a topic
///
/// Decoded messages arrive on `messages` until the topic is unsubscribed or
/// the transport closes the channel.
#[derive(Debug)]
pub struct Subscription {
    pub topic: String,
    pub messages: mpsc::Receiver<serde_json::Value>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, messages: mpsc::Receiver<serde_json::Value>) -> Self {
        Self {
            topic: topic.into(),
            messages,
        }
    }
}

/// Service-call and topic primitives supplied by the middleware transport
#[async_trait]
pub trait Connection: Send + Sync {
    /// Call a remote service and wait for its response
    async fn call_service(
        &self,
        service: &str,
        service_type: &str,
        request: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value>;

    /// Start receiving messages published on `topic`
    async fn subscribe(&self, topic: &str, message_type: &str) -> anyhow::Result<Subscription>;

    /// Stop delivery on `topic` and release any server-side resource
    async fn unsubscribe(&self, topic: &str) -> anyhow::Result<()>;
}
