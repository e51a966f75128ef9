//! TF client - frame subscriptions over a remote republishing service
//!
//! Tracks which frames the application is watching, batches them into a single
//! debounced request to the republishing service, and fans incoming transform
//! updates out to the callbacks registered for each frame.

use crate::{
    config::TfClientConfig,
    connection::{Connection, Subscription},
    error::{Result, TfError},
    messages::{
        normalize_frame_id, RepublishTfsRequest, RepublishTfsResponse, TfArray, Transform,
        REPUBLISH_TFS_SERVICE_TYPE, TF_ARRAY_MESSAGE_TYPE,
    },
};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Callback invoked with the latest transform of a watched frame
///
/// Callbacks are compared by pointer, so keep a clone of the `Arc` around to
/// unsubscribe later.
pub type TransformCallback = Arc<dyn Fn(&Transform) + Send + Sync>;

struct FrameSubscription {
    callbacks: Vec<TransformCallback>,
    transform: Option<Transform>,
}

struct ActiveStream {
    topic: String,
    reader: JoinHandle<()>,
}

#[derive(Default)]
struct ClientState {
    frames: BTreeMap<String, FrameSubscription>,
    goal_pending: bool,
    goal_timer: Option<JoinHandle<()>>,
    /// Generation of the most recently issued aggregate request
    issued_generation: u64,
    /// Generation whose response currently owns the stream
    applied_generation: u64,
    active_stream: Option<ActiveStream>,
}

struct Shared {
    connection: Arc<dyn Connection>,
    config: TfClientConfig,
    runtime: Handle,
    state: Mutex<ClientState>,
    /// Serializes callback delivery so a late subscriber never sees an older
    /// transform after a newer one. Reentrant for callbacks that subscribe.
    delivery: ReentrantMutex<()>,
}

/// Client for subscribing to frame transforms by name
///
/// Cloning is cheap; all clones share the same frame table and stream.
#[derive(Clone)]
pub struct TfClient {
    shared: Arc<Shared>,
}

impl TfClient {
    /// Create a client on top of `connection`
    ///
    /// Must be called from within a tokio runtime; the debounce timer and the
    /// stream reader run on it. No request is sent until the first subscribe.
    pub fn new(connection: Arc<dyn Connection>, config: TfClientConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            TfError::Runtime(format!("TF client requires a tokio runtime: {}", e))
        })?;
        let config = config.sanitized();

        info!(
            "TF client ready (fixed frame {}, service {})",
            config.fixed_frame, config.republish_service
        );

        Ok(Self {
            shared: Arc::new(Shared {
                connection,
                config,
                runtime,
                state: Mutex::new(ClientState::default()),
                delivery: ReentrantMutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &TfClientConfig {
        &self.shared.config
    }

    /// Watch `frame_id` and call `callback` on every update
    ///
    /// If the frame already has a known transform, `callback` is invoked with
    /// it before this returns, and always ahead of any newer live update.
    /// Adding a frame that was not watched yet schedules a new aggregate
    /// request after the debounce window.
    pub fn subscribe(&self, frame_id: &str, callback: TransformCallback) {
        let frame_id = normalize_frame_id(frame_id);
        let _delivery = self.shared.delivery.lock();

        let cached = {
            let mut state = self.shared.state.lock();
            match state.frames.get_mut(frame_id) {
                Some(entry) => {
                    entry.callbacks.push(Arc::clone(&callback));
                    entry.transform
                }
                None => {
                    debug!("Watching new frame '{}'", frame_id);
                    state.frames.insert(
                        frame_id.to_string(),
                        FrameSubscription {
                            callbacks: vec![Arc::clone(&callback)],
                            transform: None,
                        },
                    );
                    self.shared.schedule_goal(&mut state);
                    None
                }
            }
        };

        if let Some(transform) = cached {
            callback(&transform);
        }
    }

    /// Remove `callback` from `frame_id`
    ///
    /// Unknown frames and callbacks are ignored. Removing the last callback of
    /// a frame drops the frame (and its cached transform) and re-requests the
    /// remaining frames; once nothing is watched the stream is torn down.
    pub fn unsubscribe(&self, frame_id: &str, callback: &TransformCallback) {
        let frame_id = normalize_frame_id(frame_id);
        let mut state = self.shared.state.lock();

        let Some(entry) = state.frames.get_mut(frame_id) else {
            return;
        };
        let Some(position) = entry
            .callbacks
            .iter()
            .position(|c| Arc::ptr_eq(c, callback))
        else {
            return;
        };
        entry.callbacks.remove(position);
        if !entry.callbacks.is_empty() {
            return;
        }

        state.frames.remove(frame_id);
        debug!("Stopped watching frame '{}'", frame_id);

        if !state.frames.is_empty() {
            self.shared.schedule_goal(&mut state);
            return;
        }

        let (timer, stream) = Shared::detach(&mut state);
        drop(state);
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(stream) = stream {
            info!("No frames left, releasing stream {}", stream.topic);
            self.shared.release_in_background(stream);
        }
    }

    /// Cancel any queued request and release the active stream
    ///
    /// Registered callbacks and cached transforms are kept; a later change to
    /// the watched frames starts a new request cycle.
    pub async fn shutdown(&self) -> Result<()> {
        let (timer, stream) = Shared::detach(&mut self.shared.state.lock());

        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(stream) = stream {
            stream.reader.abort();
            self.shared
                .connection
                .unsubscribe(&stream.topic)
                .await
                .map_err(|e| {
                    TfError::Connection(format!("Failed to unsubscribe {}: {}", stream.topic, e))
                })?;
            info!("Released TF stream {}", stream.topic);
        }
        Ok(())
    }

    /// Frames currently watched, sorted by name
    pub fn tracked_frames(&self) -> Vec<String> {
        self.shared.state.lock().frames.keys().cloned().collect()
    }

    /// Most recent transform received for `frame_id`
    pub fn last_transform(&self, frame_id: &str) -> Option<Transform> {
        let state = self.shared.state.lock();
        state
            .frames
            .get(normalize_frame_id(frame_id))
            .and_then(|entry| entry.transform)
    }

    /// Topic of the stream currently attached, if any
    pub fn active_topic(&self) -> Option<String> {
        let state = self.shared.state.lock();
        state.active_stream.as_ref().map(|stream| stream.topic.clone())
    }

    /// Whether an aggregate request is waiting for its debounce window
    pub fn is_goal_pending(&self) -> bool {
        self.shared.state.lock().goal_pending
    }
}

impl Shared {
    /// Queue an aggregate request unless one is already queued
    fn schedule_goal(self: &Arc<Self>, state: &mut ClientState) {
        if state.goal_pending {
            return;
        }
        state.goal_pending = true;

        let shared = Arc::downgrade(self);
        let delay = self.config.goal_update_delay();
        state.goal_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            if let Err(e) = shared.send_aggregate_request().await {
                error!("TF republish request failed: {}", e);
            }
        }));
    }

    /// Stop the request cycle: clear the pending goal and invalidate every
    /// request still in flight.
    fn detach(state: &mut ClientState) -> (Option<JoinHandle<()>>, Option<ActiveStream>) {
        state.goal_pending = false;
        // Skip a generation so responses already past the staleness check
        // are rejected once their subscribe completes.
        state.issued_generation += 1;
        state.applied_generation = state.issued_generation;
        (state.goal_timer.take(), state.active_stream.take())
    }

    fn build_request(&self, source_frames: Vec<String>) -> RepublishTfsRequest {
        RepublishTfsRequest {
            source_frames,
            target_frame: self.config.fixed_frame.clone(),
            angular_thres: self.config.angular_threshold,
            trans_thres: self.config.translation_threshold,
            rate: self.config.rate,
            timeout: self.config.stream_timeout(),
        }
    }

    async fn send_aggregate_request(self: &Arc<Self>) -> Result<()> {
        let (request, generation) = {
            let mut state = self.state.lock();
            state.goal_pending = false;
            state.goal_timer = None;

            let source_frames: Vec<String> = state.frames.keys().cloned().collect();
            if source_frames.is_empty() {
                debug!("No frames watched, skipping republish request");
                return Ok(());
            }
            state.issued_generation += 1;
            (self.build_request(source_frames), state.issued_generation)
        };

        info!(
            "Requesting republish of {} frame(s) relative to {}",
            request.source_frames.len(),
            request.target_frame
        );
        debug!("Republish request #{}: {:?}", generation, request);

        let payload = serde_json::to_value(&request)?;
        let response = self
            .connection
            .call_service(&self.config.republish_service, REPUBLISH_TFS_SERVICE_TYPE, payload)
            .await
            .map_err(|e| {
                TfError::Connection(format!(
                    "{} call failed: {}",
                    self.config.republish_service, e
                ))
            })?;
        let response: RepublishTfsResponse = serde_json::from_value(response)
            .map_err(|e| TfError::Protocol(format!("Invalid republish response: {}", e)))?;

        self.handle_aggregate_response(generation, response).await
    }

    /// Replace the active stream with the one named in `response`
    async fn handle_aggregate_response(
        self: &Arc<Self>,
        generation: u64,
        response: RepublishTfsResponse,
    ) -> Result<()> {
        let previous = {
            let mut state = self.state.lock();
            if generation <= state.applied_generation {
                debug!(
                    "Ignoring stale republish response #{} ({})",
                    generation, response.topic_name
                );
                return Ok(());
            }
            state.applied_generation = generation;
            state.active_stream.take()
        };

        if let Some(previous) = previous {
            previous.reader.abort();
            if let Err(e) = self.connection.unsubscribe(&previous.topic).await {
                warn!("Failed to unsubscribe {}: {}", previous.topic, e);
            }
            debug!("Released previous TF stream {}", previous.topic);
        }

        let subscription = self
            .connection
            .subscribe(&response.topic_name, TF_ARRAY_MESSAGE_TYPE)
            .await
            .map_err(|e| {
                TfError::Connection(format!(
                    "Failed to subscribe {}: {}",
                    response.topic_name, e
                ))
            })?;
        let reader = self.runtime.spawn(read_stream(Arc::downgrade(self), subscription));
        let stream = ActiveStream {
            topic: response.topic_name,
            reader,
        };

        let replaced = {
            let mut state = self.state.lock();
            if state.applied_generation != generation {
                Err(stream)
            } else {
                Ok(state.active_stream.replace(stream))
            }
        };

        match replaced {
            Ok(displaced) => {
                if let Some(displaced) = displaced {
                    self.release_in_background(displaced);
                }
                info!("Attached TF stream for request #{}", generation);
            }
            Err(superseded) => {
                debug!("Request #{} superseded while subscribing", generation);
                self.release_in_background(superseded);
            }
        }
        Ok(())
    }

    /// Apply one stream message to the frame table and notify callbacks
    fn handle_stream_message(&self, message: serde_json::Value) {
        let batch: TfArray = match serde_json::from_value(message) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Dropping malformed TF message: {}", e);
                return;
            }
        };

        let _delivery = self.delivery.lock();
        for update in batch.transforms {
            let frame_id = normalize_frame_id(&update.child_frame_id);
            let callbacks = {
                let mut state = self.state.lock();
                let Some(entry) = state.frames.get_mut(frame_id) else {
                    continue;
                };
                entry.transform = Some(update.transform);
                entry.callbacks.clone()
            };
            for callback in &callbacks {
                callback(&update.transform);
            }
        }
    }

    fn release_in_background(&self, stream: ActiveStream) {
        stream.reader.abort();
        let connection = Arc::clone(&self.connection);
        self.runtime.spawn(async move {
            if let Err(e) = connection.unsubscribe(&stream.topic).await {
                warn!("Failed to unsubscribe {}: {}", stream.topic, e);
            }
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let (timer, stream) = Shared::detach(self.state.get_mut());
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(stream) = stream {
            self.release_in_background(stream);
        }
    }
}

async fn read_stream(shared: Weak<Shared>, mut subscription: Subscription) {
    debug!("Reading TF stream {}", subscription.topic);
    while let Some(message) = subscription.messages.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_stream_message(message);
    }
    debug!("TF stream {} closed", subscription.topic);
}
