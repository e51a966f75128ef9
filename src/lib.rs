//! tfclient - subscribe to remote coordinate-frame transforms by name
//!
//! A client-side wrapper around a TF republishing service exposed by a
//! robotics middleware bridge. Frame subscriptions are batched into one
//! debounced service request; the service answers with a stream on which
//! consolidated transform updates for the watched frames are published, and
//! each update is fanned out to the callbacks registered for its frame.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfclient::{TfClient, TfClientConfig, Transform, TransformCallback, ZenohConnection};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connection = Arc::new(ZenohConnection::new().await?);
//!     let client = TfClient::new(connection, TfClientConfig::default())?;
//!
//!     let print: TransformCallback = Arc::new(|tf: &Transform| {
//!         println!("wheel at {:?}", tf.translation);
//!     });
//!     client.subscribe("/wheel", Arc::clone(&print));
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.unsubscribe("/wheel", &print);
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **TfClient**: frame table, debounced aggregate request, stream fan-out
//! - **Connection**: transport-agnostic service-call and topic primitives
//! - **ZenohConnection**: `Connection` over a zenoh session (`zenoh-integration` feature)
//! - **TfClientConfig**: thresholds, rate, debounce and timeout options

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod zenoh_connection;

pub use client::{TfClient, TransformCallback};
pub use config::TfClientConfig;
pub use connection::{Connection, Subscription};
pub use error::{Result, TfError};
pub use messages::{
    normalize_frame_id, Quaternion, RepublishTfsRequest, RepublishTfsResponse, RosDuration,
    TfArray, Transform, TransformUpdate, Vector3,
};
pub use zenoh_connection::ZenohConnection;
