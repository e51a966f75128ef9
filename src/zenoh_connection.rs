//! Zenoh transport for the TF client
//!
//! Maps the service-call primitive onto a zenoh query and topics onto zenoh
//! subscribers. Payloads are JSON on both sides. ROS-style names are turned
//! into key expressions by dropping the leading '/'.

#[cfg(feature = "zenoh-integration")]
use {
    crate::connection::{Connection, Subscription},
    anyhow::{anyhow, Context, Result},
    async_trait::async_trait,
    parking_lot::Mutex,
    std::collections::HashMap,
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{debug, info, warn},
    zenoh::Session,
};

/// Buffered stream messages per topic before the transport waits on the client
#[cfg(feature = "zenoh-integration")]
const STREAM_BUFFER: usize = 64;

#[cfg(feature = "zenoh-integration")]
fn key_expr(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// [`Connection`] backed by a zenoh session
#[cfg(feature = "zenoh-integration")]
pub struct ZenohConnection {
    session: Session,
    forwarders: Mutex<HashMap<String, JoinHandle<()>>>,
}

#[cfg(feature = "zenoh-integration")]
impl ZenohConnection {
    /// Open a zenoh session with the default configuration
    pub async fn new() -> Result<Self> {
        Self::with_config(zenoh::Config::default()).await
    }

    pub async fn with_config(config: zenoh::Config) -> Result<Self> {
        info!("Opening Zenoh session for TF client");
        let session = zenoh::open(config)
            .await
            .map_err(|e| anyhow!("Failed to open Zenoh session: {}", e))?;
        Ok(Self::from_session(session))
    }

    /// Wrap an already opened session
    pub fn from_session(session: Session) -> Self {
        Self {
            session,
            forwarders: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(feature = "zenoh-integration")]
#[async_trait]
impl Connection for ZenohConnection {
    async fn call_service(
        &self,
        service: &str,
        service_type: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let key = key_expr(service);
        debug!("Calling {} ({}) on '{}'", service, service_type, key);

        let payload = serde_json::to_vec(&request).context("Failed to serialize service request")?;
        let replies = self
            .session
            .get(key)
            .payload(payload)
            .await
            .map_err(|e| anyhow!("Failed to query {}: {}", key, e))?;

        while let Ok(reply) = replies.recv_async().await {
            match reply.result() {
                Ok(sample) => {
                    return serde_json::from_slice(&sample.payload().to_bytes())
                        .with_context(|| format!("Invalid JSON reply from {}", key));
                }
                Err(err) => {
                    warn!(
                        "Error reply from {}: {}",
                        key,
                        String::from_utf8_lossy(&err.payload().to_bytes())
                    );
                }
            }
        }

        Err(anyhow!("No reply from service {}", service))
    }

    async fn subscribe(&self, topic: &str, message_type: &str) -> Result<Subscription> {
        let key = key_expr(topic).to_string();
        let subscriber = self
            .session
            .declare_subscriber(key.clone())
            .await
            .map_err(|e| anyhow!("Failed to subscribe to {}: {}", key, e))?;
        debug!("Subscribed to '{}' ({})", key, message_type);

        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let forwarder = tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                match serde_json::from_slice::<serde_json::Value>(&sample.payload().to_bytes()) {
                    Ok(message) => {
                        if sender.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping non-JSON sample on {}: {}", key, e),
                }
            }
        });

        if let Some(previous) = self.forwarders.lock().insert(topic.to_string(), forwarder) {
            previous.abort();
        }
        Ok(Subscription::new(topic, receiver))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        // Dropping the subscriber inside the aborted task undeclares it
        if let Some(forwarder) = self.forwarders.lock().remove(topic) {
            forwarder.abort();
            debug!("Unsubscribed from '{}'", key_expr(topic));
        }
        Ok(())
    }
}

#[cfg(feature = "zenoh-integration")]
impl Drop for ZenohConnection {
    fn drop(&mut self) {
        for (_, forwarder) in self.forwarders.get_mut().drain() {
            forwarder.abort();
        }
    }
}

#[cfg(not(feature = "zenoh-integration"))]
pub struct ZenohConnection;

#[cfg(not(feature = "zenoh-integration"))]
impl ZenohConnection {
    pub async fn new() -> anyhow::Result<Self> {
        Err(anyhow::anyhow!(
            "Zenoh integration not enabled. Enable with --features zenoh-integration"
        ))
    }
}

#[cfg(not(feature = "zenoh-integration"))]
#[async_trait::async_trait]
impl crate::connection::Connection for ZenohConnection {
    async fn call_service(
        &self,
        _service: &str,
        _service_type: &str,
        _request: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        Err(anyhow::anyhow!("Zenoh integration not enabled"))
    }

    async fn subscribe(
        &self,
        _topic: &str,
        _message_type: &str,
    ) -> anyhow::Result<crate::connection::Subscription> {
        Err(anyhow::anyhow!("Zenoh integration not enabled"))
    }

    async fn unsubscribe(&self, _topic: &str) -> anyhow::Result<()> {
        Ok(()) // Nothing was ever subscribed
    }
}
