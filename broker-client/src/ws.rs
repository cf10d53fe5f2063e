//! STOMP over WebSocket transport
//!
//! Each activation spawns one session task that owns the socket. The task
//! performs the WebSocket handshake, sends CONNECT, waits at most
//! `connect_timeout` for CONNECTED, then multiplexes
//! outbound frames, inbound frames and heart-beats until the socket ends or
//! the session is deactivated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message;

use crate::config::BrokerConfig;
use crate::error::TransportError;
use crate::frame::{negotiate_heartbeat, Command, Frame};
use crate::message::{BrokerMessage, Dispatcher, Headers};
use crate::transport::{SessionEvents, Transport, TransportSession};

/// Supplies extra HTTP headers for each WebSocket handshake (e.g. `Cookie`)
pub type HandshakeHeaders = Arc<dyn Fn() -> Vec<(String, String)> + Send + Sync>;

/// [`Transport`] speaking STOMP 1.2 over tokio-tungstenite
#[derive(Clone)]
pub struct WsTransport {
    config: BrokerConfig,
    handshake_headers: Option<HandshakeHeaders>,
}

impl WsTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            handshake_headers: None,
        }
    }

    /// Add headers to every handshake; the provider is called per attempt
    pub fn with_handshake_headers<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.handshake_headers = Some(Arc::new(provider));
        self
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.config.url)
            .field("handshake_headers", &self.handshake_headers.is_some())
            .finish()
    }
}

impl Transport for WsTransport {
    fn activate(&self, events: SessionEvents) -> Arc<dyn TransportSession> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WsShared {
            active: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            routes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            outbound,
            shutdown: Notify::new(),
        });

        let task = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(run_session(
                self.config.clone(),
                self.handshake_headers.clone(),
                Arc::clone(&shared),
                outbound_rx,
                events,
            ))),
            Err(_) => {
                tracing::error!("No Tokio runtime available; WebSocket session not started");
                shared.active.store(false, Ordering::SeqCst);
                None
            }
        };

        Arc::new(WsSession {
            shared,
            task: tokio::sync::Mutex::new(task),
        })
    }
}

struct WsShared {
    active: AtomicBool,
    connected: AtomicBool,
    /// Live subscription id -> dispatcher
    routes: Mutex<HashMap<String, Dispatcher>>,
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<Frame>,
    shutdown: Notify,
}

impl WsShared {
    fn queue(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }
}

struct WsSession {
    shared: Arc<WsShared>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TransportSession for WsSession {
    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    fn subscribe(
        &self,
        destination: &str,
        headers: &Headers,
        dispatcher: Dispatcher,
    ) -> Result<String, TransportError> {
        let id = format!("sub-{}", self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.routes.lock().insert(id.clone(), dispatcher);

        if let Err(e) = self.shared.queue(Frame::subscribe(&id, destination, headers)) {
            self.shared.routes.lock().remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    fn publish(&self, destination: &str, body: &str, headers: &Headers) -> Result<(), TransportError> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.shared.queue(Frame::send(destination, body, headers))
    }

    async fn deactivate(&self) {
        self.shared.shutdown.notify_one();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("WebSocket session task panicked");
                }
            }
        }
    }
}

async fn run_session(
    config: BrokerConfig,
    handshake_headers: Option<HandshakeHeaders>,
    shared: Arc<WsShared>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: SessionEvents,
) {
    let result = drive(&config, handshake_headers, &shared, &mut outbound, &events).await;

    // Errors are reported while the session still counts as active, so the
    // client defers its retry until the close below.
    match &result {
        Err(TransportError::Protocol(message)) => events.protocol_error(message),
        Err(e) => events.socket_error(&e.to_string()),
        Ok(()) => tracing::debug!(generation = events.generation(), "WebSocket session ended"),
    }

    shared.connected.store(false, Ordering::SeqCst);
    shared.active.store(false, Ordering::SeqCst);
    shared.routes.lock().clear();
    events.closed();
}

fn socket_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Socket(e.to_string())
}

fn build_request(url: &str, handshake_headers: Option<HandshakeHeaders>) -> Result<Request<()>, TransportError> {
    let mut request = url.into_client_request().map_err(socket_error)?;

    if let Some(provider) = handshake_headers {
        for (name, value) in provider() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Socket(format!("Invalid handshake header {name}: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| TransportError::Socket(format!("Invalid handshake header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }
    }

    Ok(request)
}

/// Heart-beat bookkeeping for one session
struct Heartbeats {
    outgoing: Option<Interval>,
    watchdog: Option<Interval>,
    silence_limit: Option<Duration>,
    last_seen: Instant,
}

impl Heartbeats {
    fn idle() -> Self {
        Self {
            outgoing: None,
            watchdog: None,
            silence_limit: None,
            last_seen: Instant::now(),
        }
    }

    fn arm(&mut self, outgoing: Option<Duration>, incoming: Option<Duration>, tolerance: u32) {
        self.outgoing = outgoing.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        self.silence_limit = incoming.map(|period| period * tolerance);
        self.watchdog = incoming.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        self.last_seen = Instant::now();
    }

    fn broker_silent(&self) -> bool {
        self.silence_limit
            .is_some_and(|limit| self.last_seen.elapsed() > limit)
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn drive(
    config: &BrokerConfig,
    handshake_headers: Option<HandshakeHeaders>,
    shared: &WsShared,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    events: &SessionEvents,
) -> Result<(), TransportError> {
    let request = build_request(&config.url, handshake_headers)?;
    let host = url::Url::parse(&config.url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());

    let (socket, _) = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await
    .map_err(|_| TransportError::Socket(format!("Handshake timed out after {:?}", config.connect_timeout)))?
    .map_err(socket_error)?;

    tracing::debug!(url = %config.url, "WebSocket open; sending CONNECT");
    let (mut sink, mut stream) = socket.split();

    let connect = Frame::connect(&host, config.heartbeat_outgoing, config.heartbeat_incoming);
    sink.send(Message::Text(connect.encode()))
        .await
        .map_err(socket_error)?;

    let mut heartbeats = Heartbeats::idle();
    let connected_deadline = Instant::now() + config.connect_timeout;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(connected_deadline), if !shared.connected.load(Ordering::SeqCst) => {
                return Err(TransportError::Socket(format!(
                    "No CONNECTED frame within {:?}",
                    config.connect_timeout
                )));
            }

            _ = shared.shutdown.notified() => {
                if shared.connected.load(Ordering::SeqCst) {
                    let disconnect = Frame::disconnect(&format!("disconnect-{}", events.generation()));
                    if let Err(e) = sink.send(Message::Text(disconnect.encode())).await {
                        tracing::debug!("Failed to send DISCONNECT: {}", e);
                    }
                }
                let _ = sink.close().await;
                return Ok(());
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                tracing::trace!(command = %frame.command, "Sending frame");
                sink.send(Message::Text(frame.encode()))
                    .await
                    .map_err(socket_error)?;
            }

            incoming = stream.next() => {
                let Some(incoming) = incoming else {
                    return Ok(());
                };
                heartbeats.last_seen = Instant::now();

                let text = match incoming.map_err(socket_error)? {
                    Message::Text(text) => text,
                    Message::Binary(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!("Dropping non UTF-8 binary message");
                            continue;
                        }
                    },
                    Message::Close(close) => {
                        tracing::debug!(?close, "Broker closed the WebSocket");
                        return Ok(());
                    }
                    _ => continue,
                };

                let frames = match Frame::parse_all(&text) {
                    Ok(frames) => frames,
                    Err(e) => {
                        tracing::warn!("Dropping unparseable broker message: {}", e);
                        continue;
                    }
                };

                for frame in frames {
                    handle_frame(frame, config, shared, events, &mut heartbeats)?;
                }
            }

            _ = tick(&mut heartbeats.outgoing) => {
                sink.send(Message::Text("\n".to_string()))
                    .await
                    .map_err(socket_error)?;
            }

            _ = tick(&mut heartbeats.watchdog) => {
                if heartbeats.broker_silent() {
                    return Err(TransportError::Socket(format!(
                        "No heart-beat from broker for {:?}",
                        heartbeats.last_seen.elapsed()
                    )));
                }
            }
        }
    }
}

fn handle_frame(
    frame: Frame,
    config: &BrokerConfig,
    shared: &WsShared,
    events: &SessionEvents,
    heartbeats: &mut Heartbeats,
) -> Result<(), TransportError> {
    match frame.command {
        Command::Connected => {
            let (outgoing, incoming) = negotiate_heartbeat(
                config.heartbeat_outgoing,
                config.heartbeat_incoming,
                frame.get_header("heart-beat"),
            );
            tracing::debug!(
                version = frame.get_header("version").unwrap_or("1.0"),
                ?outgoing,
                ?incoming,
                "STOMP session established"
            );
            heartbeats.arm(outgoing, incoming, config.heartbeat_tolerance);
            shared.connected.store(true, Ordering::SeqCst);
            events.connected();
        }
        Command::Message => {
            let subscription = frame.get_header("subscription").unwrap_or_default().to_string();
            let dispatcher = shared.routes.lock().get(&subscription).cloned();
            match dispatcher {
                Some(dispatcher) => dispatcher(&BrokerMessage::from_frame(frame)),
                None => tracing::debug!(subscription = %subscription, "MESSAGE for unknown subscription"),
            }
        }
        Command::Error => {
            let message = frame
                .get_header("message")
                .map(str::to_string)
                .unwrap_or_else(|| frame.body.clone());
            return Err(TransportError::Protocol(message));
        }
        Command::Receipt => {
            tracing::debug!(receipt = frame.get_header("receipt-id").unwrap_or_default(), "RECEIPT");
        }
        other => {
            tracing::debug!(command = %other, "Ignoring unexpected frame from broker");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_adds_handshake_headers() {
        let provider: HandshakeHeaders =
            Arc::new(|| vec![("Cookie".to_string(), "access_token=abc".to_string())]);
        let request = build_request("ws://localhost:9005/ws", Some(provider)).unwrap();

        assert_eq!(
            request.headers().get("cookie").and_then(|v| v.to_str().ok()),
            Some("access_token=abc")
        );
    }

    #[test]
    fn test_build_request_rejects_invalid_header() {
        let provider: HandshakeHeaders = Arc::new(|| vec![("Bad Header".to_string(), "x".to_string())]);
        assert!(build_request("ws://localhost:9005/ws", Some(provider)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_silence_detection() {
        let mut heartbeats = Heartbeats::idle();
        heartbeats.arm(None, Some(Duration::from_secs(10)), 2);
        assert!(!heartbeats.broker_silent());

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(!heartbeats.broker_silent());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(heartbeats.broker_silent());
    }

    #[tokio::test]
    async fn test_handle_frame_routes_messages_and_reports_errors() {
        let (outbound, _rx) = mpsc::unbounded_channel();
        let shared = WsShared {
            active: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            outbound,
            shutdown: Notify::new(),
        };

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        shared.routes.lock().insert(
            "sub-0".to_string(),
            Arc::new(move |message: &BrokerMessage| sink.lock().push(message.body.clone())),
        );

        let events = SessionEvents::new(std::sync::Weak::new(), 1);
        let config = BrokerConfig::default();
        let mut heartbeats = Heartbeats::idle();

        let message = Frame::new(Command::Message)
            .header("subscription", "sub-0")
            .header("destination", "/topic/rooms/1")
            .with_body("hello");
        handle_frame(message, &config, &shared, &events, &mut heartbeats).unwrap();
        assert_eq!(*received.lock(), vec!["hello".to_string()]);

        let error = Frame::new(Command::Error).header("message", "access denied");
        assert_eq!(
            handle_frame(error, &config, &shared, &events, &mut heartbeats),
            Err(TransportError::Protocol("access denied".to_string()))
        );
    }

    #[tokio::test]
    async fn test_closed_session_rejects_frames() {
        let (outbound, _rx) = mpsc::unbounded_channel();
        let shared = WsShared {
            active: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            routes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            outbound,
            shutdown: Notify::new(),
        };
        assert_eq!(shared.queue(Frame::disconnect("disconnect-1")), Err(TransportError::Closed));
    }
}
