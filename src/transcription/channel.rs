//! Push channel WebSocket connection handling
//!
//! Keeps one inbound event stream open per client identity at
//! `ws(s)://{host}/api/transcribe/ws/{client_id}`. Drops and failed connects
//! are retried after a fixed delay for as long as the channel lives; callers
//! only ever see decoded messages.

use super::helpers::join_path;
use super::identity::ClientIdentity;
use super::messages::PushMessage;
use crate::error::{ConfigError, ParseError};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, trace, warn};
use url::Url;

/// Delay between reconnection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// WebSocket connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const PUSH_PATH_PREFIX: &str = "api/transcribe/ws";

/// Dispatch target for decoded push messages
pub type PushHandler = Arc<dyn Fn(PushMessage) + Send + Sync>;

type HandlerSlot = Arc<Mutex<Option<PushHandler>>>;

/// Timing for the reconnect loop
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// How a connected session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiveOutcome {
    /// Server sent a close frame
    Closed,
    /// Transport error while reading
    Failed,
    /// Stream ended without a close frame
    Ended,
}

/// Persistent, self-healing push connection
pub struct PushChannel {
    base_url: Url,
    config: ChannelConfig,
    handler: HandlerSlot,
    identity: Option<ClientIdentity>,
    should_stop: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    /// Create a channel against the server at `base_url` (http, https, ws or wss)
    pub fn new(base_url: &Url, config: ChannelConfig) -> Self {
        Self {
            base_url: base_url.clone(),
            config,
            handler: Arc::new(Mutex::new(None)),
            identity: None,
            should_stop: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            connected: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Register the single dispatch target, replacing any previous one
    pub fn on_event<F>(&mut self, handler: F)
    where
        F: Fn(PushMessage) + Send + Sync + 'static,
    {
        let handler: PushHandler = Arc::new(handler);
        match self.handler.lock() {
            Ok(mut slot) => *slot = Some(handler),
            Err(poisoned) => {
                warn!("Push handler mutex was poisoned, recovering");
                *poisoned.into_inner() = Some(handler);
            }
        }
    }

    /// Start the connection loop for `identity`
    ///
    /// Reuses the running loop when already connected for the same identity.
    pub fn connect(&mut self, identity: &ClientIdentity) -> Result<(), ConfigError> {
        if self.identity.as_ref() == Some(identity) && self.is_running() {
            debug!(client_id = %identity, "Push channel already running, reusing");
            return Ok(());
        }
        self.shutdown();

        let ws_url = build_push_url(&self.base_url, identity)?;
        info!(client_id = %identity, ws_url = %ws_url, "Starting push channel");

        self.should_stop = Arc::new(AtomicBool::new(false));
        self.stop_notify = Arc::new(Notify::new());
        self.identity = Some(identity.clone());
        self.task = Some(tokio::spawn(run_push_loop(
            ws_url,
            self.config.clone(),
            self.handler.clone(),
            self.should_stop.clone(),
            self.stop_notify.clone(),
            self.connected.clone(),
        )));
        Ok(())
    }

    /// Whether a transport is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the reconnect loop and close the transport
    pub fn shutdown(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        self.stop_notify.notify_one();
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Push channel shut down");
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the per-client push URL from the server base URL
pub fn build_push_url(base_url: &Url, identity: &ClientIdentity) -> Result<Url, ConfigError> {
    let scheme = match base_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConfigError::InvalidServerUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme {}", other),
            })
        }
    };

    let mut url = base_url.clone();
    url.set_scheme(scheme)
        .map_err(|_| ConfigError::InvalidServerUrl {
            url: base_url.to_string(),
            reason: "cannot derive WebSocket scheme".to_string(),
        })?;
    url.set_path(&join_path(
        base_url.path(),
        &format!("{}/{}", PUSH_PATH_PREFIX, identity.as_str()),
    ));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Main connection loop; runs until `should_stop` is set
#[tracing::instrument(skip_all, fields(ws_url = %ws_url))]
async fn run_push_loop(
    ws_url: Url,
    config: ChannelConfig,
    handler: HandlerSlot,
    should_stop: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    connected: Arc<AtomicBool>,
) {
    let mut attempt = 0u32;

    loop {
        if should_stop.load(Ordering::SeqCst) {
            break;
        }

        if attempt > 0 {
            debug!(attempt, "Reconnecting push channel");
            tokio::select! {
                _ = sleep(config.reconnect_delay) => {}
                _ = stop_notify.notified() => break,
            }
        }
        attempt = attempt.saturating_add(1);

        let ws_stream = match timeout(config.connect_timeout, connect_async(ws_url.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                warn!(attempt, "Push channel connection failed: {}", e);
                continue;
            }
            Err(_) => {
                warn!(attempt, "Push channel connection timed out");
                continue;
            }
        };

        info!("Push channel connected");
        connected.store(true, Ordering::SeqCst);
        attempt = 1;

        let outcome = tokio::select! {
            outcome = dispatch_messages(ws_stream, &handler) => outcome,
            _ = stop_notify.notified() => {
                connected.store(false, Ordering::SeqCst);
                break;
            }
        };
        connected.store(false, Ordering::SeqCst);

        match outcome {
            ReceiveOutcome::Closed => info!("Push channel closed by server, will reconnect"),
            ReceiveOutcome::Failed | ReceiveOutcome::Ended => {
                warn!("Push channel lost, will reconnect")
            }
        }
    }

    debug!("Push channel loop exited");
}

/// Decode a single frame; control frames yield nothing
pub(crate) fn decode_frame(message: &Message) -> Result<Option<PushMessage>, ParseError> {
    match message {
        Message::Text(text) => PushMessage::parse(text).map(Some),
        Message::Binary(_) => Err(ParseError::UnsupportedFrame("binary")),
        _ => Ok(None),
    }
}

/// Read frames until the connection ends, dispatching every decoded message
pub(crate) async fn dispatch_messages<S>(mut ws_stream: S, handler: &HandlerSlot) -> ReceiveOutcome
where
    S: StreamExt<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = ws_stream.next().await {
        let message = match msg_result {
            Ok(Message::Close(frame)) => {
                debug!(?frame, "Push channel close frame");
                return ReceiveOutcome::Closed;
            }
            Ok(message) => message,
            Err(e) => {
                warn!("Push channel receive error: {}", e);
                return ReceiveOutcome::Failed;
            }
        };

        match decode_frame(&message) {
            Ok(Some(push)) => {
                trace!(kind = push.kind(), "Push message");
                dispatch(handler, push);
            }
            Ok(None) => trace!("Push channel control frame"),
            Err(e) => debug!("Dropping push frame: {}", e),
        }
    }

    ReceiveOutcome::Ended
}

fn dispatch(handler: &HandlerSlot, message: PushMessage) {
    let target = match handler.lock() {
        Ok(slot) => slot.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    match target {
        Some(target) => target(message),
        None => trace!(kind = message.kind(), "No push handler registered, dropping"),
    }
}
