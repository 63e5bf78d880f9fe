use crate::config::{AnalogScale, BridgeConfig};
use crate::error::{PanelError, Result};
use crate::join::lock;
use crate::protocol::{decode_value, parse_id, Frame};
use crate::transport::{StateCallback, Transport, TransportEvent};
use crate::types::{JoinId, JoinKind, JoinValue, SubscriptionHandle};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type JoinKey = (JoinKind, JoinId);

/// State shared between the transport handle and its connection task
struct BridgeState {
    /// Outgoing frames for the current session; `None` while disconnected
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    /// Local callbacks per join
    subscribers: HashMap<JoinKey, Vec<(SubscriptionHandle, StateCallback)>>,
    /// Last value reported by the bridge per join
    last_values: HashMap<JoinKey, JoinValue>,
}

struct BridgeShared {
    state: Mutex<BridgeState>,
    events_tx: broadcast::Sender<TransportEvent>,
    scale: AnalogScale,
}

impl BridgeShared {
    fn emit(&self, event: TransportEvent) {
        // No receivers is fine
        let _ = self.events_tx.send(event);
    }

    fn send_frame(state: &BridgeState, frame: &Frame) -> Result<()> {
        let json = frame.to_json()?;
        tracing::debug!("Sending: {}", json);
        state
            .outgoing
            .as_ref()
            .ok_or(PanelError::ConnectionClosed)?
            .send(Message::Text(json))
            .map_err(|_| PanelError::ConnectionClosed)
    }

    /// Start a session: accept writes and re-send every upstream subscription
    ///
    /// Frames queue in the returned channel until the session's writer runs.
    fn open_session(&self) -> mpsc::UnboundedReceiver<Message> {
        let (outgoing, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        state.outgoing = Some(outgoing);
        let keys: Vec<JoinKey> = state.subscribers.keys().copied().collect();
        for (kind, id) in keys {
            if let Err(e) = Self::send_frame(&state, &Frame::subscribe(kind, id)) {
                tracing::error!(%kind, %id, "Failed to resubscribe: {}", e);
            }
        }
        rx
    }

    fn detach(&self) {
        lock(&self.state).outgoing = None;
    }

    /// Handle an incoming text frame
    fn handle_text(&self, text: &str) -> Result<()> {
        tracing::debug!("Received: {}", text);

        match Frame::from_json(text)? {
            Frame::State { kind, id, value } => {
                let id = parse_id(&id)?;
                let value = decode_value(kind, &value, self.scale);
                let callbacks: Vec<StateCallback> = {
                    let mut state = lock(&self.state);
                    state.last_values.insert((kind, id), value.clone());
                    state
                        .subscribers
                        .get(&(kind, id))
                        .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
                        .unwrap_or_default()
                };
                for callback in callbacks {
                    callback(value.clone());
                }
                Ok(())
            }
            Frame::Error { detail } => {
                self.emit(TransportEvent::Error { detail });
                Ok(())
            }
            other => Err(PanelError::InvalidResponse(format!(
                "Unexpected frame from bridge: {:?}",
                other
            ))),
        }
    }
}

/// Live transport talking to a WebSocket bridge
///
/// The bridge owns the actual control-system connection. This adapter
/// forwards subscriptions and publishes as JSON frames, keeps one upstream
/// subscription per join however many local callbacks exist, and reconnects
/// with exponential backoff when the socket drops.
pub struct BridgeTransport {
    shared: Arc<BridgeShared>,
    url: String,
    stop_tx: broadcast::Sender<()>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeTransport {
    /// Connect to the bridge
    ///
    /// Fails if the first connection does not succeed within the configured
    /// timeout; later drops are handled in the background.
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        let url = config.url();
        tracing::info!("Connecting to bridge at {}", url);

        let (ws_stream, _) = timeout(config.connect_timeout(), connect_async(url.as_str()))
            .await
            .map_err(|_| PanelError::Timeout)??;

        let (events_tx, _) = broadcast::channel(100);
        let shared = Arc::new(BridgeShared {
            state: Mutex::new(BridgeState {
                outgoing: None,
                subscribers: HashMap::new(),
                last_values: HashMap::new(),
            }),
            events_tx,
            scale: config.analog_scale,
        });

        let outgoing = shared.open_session();
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let handle = tokio::spawn(supervise(
            shared.clone(),
            url.clone(),
            (ws_stream, outgoing),
            stop_rx,
        ));

        Ok(Self {
            shared,
            url,
            stop_tx,
            task_handle: Mutex::new(Some(handle)),
        })
    }

    /// WebSocket URL of the bridge
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a session with the bridge is currently open
    pub fn is_connected(&self) -> bool {
        lock(&self.shared.state).outgoing.is_some()
    }

    /// Close the connection and stop reconnecting
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(());
        let handle = lock(&self.task_handle).take();
        if let Some(handle) = handle {
            // Give it a moment to stop gracefully
            let _ = timeout(Duration::from_millis(500), handle).await;
        }
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

impl Transport for BridgeTransport {
    fn subscribe_state(
        &self,
        kind: JoinKind,
        id: JoinId,
        callback: StateCallback,
    ) -> Result<SubscriptionHandle> {
        let handle = SubscriptionHandle::new();
        let replay = {
            let mut state = lock(&self.shared.state);
            let subscribers = state.subscribers.entry((kind, id)).or_default();
            let first = subscribers.is_empty();
            subscribers.push((handle, callback.clone()));

            // A session that is going away resubscribes on its replacement
            if first && state.outgoing.is_some() {
                if let Err(e) = BridgeShared::send_frame(&state, &Frame::subscribe(kind, id)) {
                    tracing::warn!(%kind, %id, "Upstream subscribe deferred: {}", e);
                }
            }
            state.last_values.get(&(kind, id)).cloned()
        };

        if let Some(value) = replay {
            callback(value);
        }
        Ok(handle)
    }

    fn unsubscribe_state(&self, kind: JoinKind, id: JoinId, handle: SubscriptionHandle) {
        let mut state = lock(&self.shared.state);
        let Some(subscribers) = state.subscribers.get_mut(&(kind, id)) else {
            return;
        };
        subscribers.retain(|(h, _)| *h != handle);
        if !subscribers.is_empty() {
            return;
        }

        state.subscribers.remove(&(kind, id));
        state.last_values.remove(&(kind, id));
        if state.outgoing.is_some() {
            if let Err(e) = BridgeShared::send_frame(&state, &Frame::unsubscribe(kind, id)) {
                tracing::warn!(%kind, %id, "Failed to unsubscribe upstream: {}", e);
            }
        }
    }

    fn publish_event(&self, kind: JoinKind, id: JoinId, value: JoinValue) -> Result<()> {
        if value.kind() != kind {
            return Err(PanelError::Publish {
                kind,
                id,
                detail: format!("{} value on a {} join", value.kind(), kind),
            });
        }
        let state = lock(&self.shared.state);
        BridgeShared::send_frame(&state, &Frame::publish(id, &value, self.shared.scale))
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events_tx.subscribe()
    }
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 60s
fn next_backoff(current: Duration) -> Duration {
    if current.is_zero() {
        Duration::from_secs(1)
    } else {
        (current * 2).min(MAX_BACKOFF)
    }
}

/// Keep a session with the bridge alive until stopped
async fn supervise(
    shared: Arc<BridgeShared>,
    url: String,
    first: (WsStream, mpsc::UnboundedReceiver<Message>),
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut session = Some(first);
    let mut backoff = Duration::ZERO;

    loop {
        let (ws, outgoing) = match session.take() {
            Some(session) => session,
            None => {
                if !backoff.is_zero() {
                    tracing::info!("Reconnecting to bridge in {:?}", backoff);
                    tokio::select! {
                        _ = stop_rx.recv() => break,
                        _ = sleep(backoff) => {}
                    }
                }

                let attempt = tokio::select! {
                    _ = stop_rx.recv() => break,
                    attempt = connect_async(url.as_str()) => attempt,
                };
                match attempt {
                    Ok((ws, _)) => {
                        backoff = Duration::ZERO;
                        let outgoing = shared.open_session();
                        shared.emit(TransportEvent::Connected { detail: url.clone() });
                        (ws, outgoing)
                    }
                    Err(e) => {
                        tracing::error!("Bridge reconnect failed: {}", e);
                        shared.emit(TransportEvent::Error {
                            detail: e.to_string(),
                        });
                        backoff = next_backoff(backoff);
                        continue;
                    }
                }
            }
        };

        let reason = tokio::select! {
            _ = stop_rx.recv() => {
                shared.detach();
                tracing::info!("Bridge connection stopped");
                break;
            }
            reason = run_session(&shared, ws, outgoing) => reason,
        };

        tracing::warn!("Bridge session ended: {}", reason);
        shared.emit(TransportEvent::Disconnected { detail: reason });
        backoff = next_backoff(backoff);
    }
}

/// Pump one WebSocket session; returns why it ended
async fn run_session(
    shared: &Arc<BridgeShared>,
    ws: WsStream,
    mut ws_rx: mpsc::UnboundedReceiver<Message>,
) -> String {
    let (mut write, mut read) = ws.split();

    // Spawn task to forward outgoing frames to the socket
    let writer = tokio::spawn(async move {
        while let Some(msg) = ws_rx.recv().await {
            if let Err(e) = write.send(msg).await {
                tracing::error!("Failed to send frame: {}", e);
                break;
            }
        }
    });

    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = shared.handle_text(&text) {
                    tracing::warn!("Ignoring frame: {}", e);
                }
            }
            Some(Ok(Message::Close(_))) => break "closed by bridge".to_string(),
            Some(Err(e)) => {
                tracing::error!("WebSocket error: {}", e);
                break e.to_string();
            }
            None => break "stream ended".to_string(),
            _ => {}
        }
    };

    shared.detach();
    writer.abort();
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = Duration::ZERO;
        let mut seen = Vec::new();
        for _ in 0..8 {
            backoff = next_backoff(backoff);
            seen.push(backoff.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }
}
