//! Connection channel: one persistent WebSocket to the process manager.
//!
//! The socket lives in a spawned task. Everything else talks to it through a
//! cheap, cloneable [`ChannelHandle`] (outbound text + polled status) and a
//! receiver of [`ChannelEvent`]s. Inbound text is shape-checked here, so
//! consumers only ever see well-formed [`Frame`]s; malformed frames are
//! logged and dropped without closing the connection.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::protocol::{Command, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl ConnectionStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionStatus::Connecting,
            1 => ConnectionStatus::Open,
            _ => ConnectionStatus::Closed,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "connected",
            ConnectionStatus::Closed => "disconnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// `reconnected` is set for every open after the first one.
    Opened { reconnected: bool },
    /// `gave_up` is set when no further reconnect will be attempted.
    Closed { reason: String, gave_up: bool },
    Error(String),
    Frame(Frame),
}

#[derive(Debug, Clone)]
struct SharedStatus(Arc<AtomicU8>);

impl SharedStatus {
    fn new(status: ConnectionStatus) -> Self {
        Self(Arc::new(AtomicU8::new(status as u8)))
    }

    fn get(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, status: ConnectionStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct ChannelHandle {
    status: SharedStatus,
    outbound: mpsc::UnboundedSender<String>,
}

impl ChannelHandle {
    /// A handle with no socket behind it. Outbound text lands on the returned
    /// [`DetachedChannel`], whose owner also drives the status.
    pub fn detached() -> (Self, DetachedChannel) {
        let status = SharedStatus::new(ConnectionStatus::Connecting);
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                status: status.clone(),
                outbound: tx,
            },
            DetachedChannel {
                status,
                outbound: rx,
            },
        )
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Transmit a pre-serialized frame. Never fails towards the caller:
    /// problems are logged and the message is dropped.
    pub fn send(&self, message: impl Into<String>) {
        let message = message.into();
        if serde_json::from_str::<Value>(&message).is_err() {
            error!(%message, "message to send is not valid JSON");
        }
        if !self.is_connected() {
            warn!(%message, status = self.status().label(), "not connected, dropping message");
            return;
        }
        if self.outbound.send(message).is_err() {
            error!("connection task is gone, dropping message");
        }
    }

    pub fn send_command(&self, command: &Command) {
        self.send(command.encode());
    }
}

/// The far side of a [`ChannelHandle::detached`] handle.
#[derive(Debug)]
pub struct DetachedChannel {
    status: SharedStatus,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl DetachedChannel {
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.set(status);
    }

    /// Everything sent since the last call.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            out.push(message);
        }
        out
    }

    pub fn drain_commands(&mut self) -> Vec<Command> {
        self.drain()
            .iter()
            .filter_map(|m| Command::decode(m))
            .collect()
    }
}

#[cfg(feature = "net")]
pub use net::Channel;

#[cfg(feature = "net")]
mod net {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
    use tracing::{debug, error, info, warn};

    use super::{ChannelEvent, ChannelHandle, ConnectionStatus, SharedStatus};
    use crate::config::{ClientConfig, ReconnectPolicy};
    use crate::error::FrameError;
    use crate::protocol::Frame;

    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    enum PumpEnd {
        Closed(String),
        Failed(String),
        /// Every handle was dropped or the event receiver is gone.
        Abandoned,
    }

    pub struct Channel;

    impl Channel {
        /// Spawn the connection task. Must be called inside a tokio runtime.
        pub fn connect(
            config: &ClientConfig,
        ) -> (ChannelHandle, mpsc::UnboundedReceiver<ChannelEvent>) {
            let status = SharedStatus::new(ConnectionStatus::Connecting);
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (ev_tx, ev_rx) = mpsc::unbounded_channel();

            tokio::spawn(run(
                config.endpoint.clone(),
                config.reconnect.clone(),
                status.clone(),
                out_rx,
                ev_tx,
            ));

            (
                ChannelHandle {
                    status,
                    outbound: out_tx,
                },
                ev_rx,
            )
        }
    }

    async fn run(
        endpoint: String,
        policy: ReconnectPolicy,
        status: SharedStatus,
        mut outbound: mpsc::UnboundedReceiver<String>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) {
        let mut attempt: u32 = 0;
        let mut opened_before = false;

        loop {
            status.set(ConnectionStatus::Connecting);
            info!(endpoint = %endpoint, attempt, "connecting");

            let reason = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
                Ok((socket, _response)) => {
                    // Commands queued while the previous socket was dying are lost.
                    while let Ok(stale) = outbound.try_recv() {
                        warn!(message = %stale, "dropping message queued before reconnect");
                    }
                    attempt = 0;
                    status.set(ConnectionStatus::Open);
                    info!(endpoint = %endpoint, reconnected = opened_before, "websocket connected");
                    if events
                        .send(ChannelEvent::Opened {
                            reconnected: opened_before,
                        })
                        .is_err()
                    {
                        status.set(ConnectionStatus::Closed);
                        return;
                    }
                    opened_before = true;

                    match pump(socket, &mut outbound, &events).await {
                        PumpEnd::Abandoned => {
                            status.set(ConnectionStatus::Closed);
                            debug!("channel abandoned, connection task exiting");
                            return;
                        }
                        PumpEnd::Closed(reason) => {
                            info!(%reason, "websocket disconnected");
                            reason
                        }
                        PumpEnd::Failed(err) => {
                            error!(error = %err, "websocket error");
                            let _ = events.send(ChannelEvent::Error(err.clone()));
                            err
                        }
                    }
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "websocket connect failed");
                    e.to_string()
                }
            };

            status.set(ConnectionStatus::Closed);
            attempt = attempt.saturating_add(1);
            let retry = policy.delay_for(attempt);
            let closed = ChannelEvent::Closed {
                reason,
                gave_up: retry.is_none(),
            };
            if events.send(closed).is_err() {
                return;
            }

            let Some(delay) = retry else {
                info!(attempts = attempt, "not reconnecting");
                return;
            };
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn pump(
        socket: Socket,
        outbound: &mut mpsc::UnboundedReceiver<String>,
        events: &mpsc::UnboundedSender<ChannelEvent>,
    ) -> PumpEnd {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                inbound = read.next() => {
                    let decoded = match inbound {
                        Some(Ok(Message::Text(text))) => Frame::decode(&text),
                        Some(Ok(Message::Binary(bytes))) => Frame::decode_bytes(&bytes),
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                                .unwrap_or_else(|| "closed by server".to_string());
                            return PumpEnd::Closed(reason);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return PumpEnd::Failed(e.to_string()),
                        None => return PumpEnd::Closed("stream ended".to_string()),
                    };
                    if !deliver(decoded, events) {
                        return PumpEnd::Abandoned;
                    }
                }
                message = outbound.recv() => {
                    let Some(text) = message else {
                        let _ = write.close().await;
                        return PumpEnd::Abandoned;
                    };
                    debug!(message = %text, "sending");
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return PumpEnd::Failed(e.to_string());
                    }
                }
            }
        }
    }

    /// Returns `false` once nobody listens for events anymore.
    fn deliver(
        decoded: Result<Frame, FrameError>,
        events: &mpsc::UnboundedSender<ChannelEvent>,
    ) -> bool {
        match decoded {
            Ok(frame) => {
                debug!(event = %frame.event, "frame received");
                events.send(ChannelEvent::Frame(frame)).is_ok()
            }
            Err(e) => {
                error!(error = %e, "dropping malformed frame");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_only_sends_when_open() {
        let (handle, mut far) = ChannelHandle::detached();
        assert!(!handle.is_connected());

        handle.send_command(&Command::StartNode("api".into()));
        assert!(far.drain().is_empty());

        far.set_status(ConnectionStatus::Open);
        assert!(handle.is_connected());
        handle.send_command(&Command::StartNode("api".into()));
        assert_eq!(far.drain(), vec![r#"["startNode","api"]"#.to_string()]);

        far.set_status(ConnectionStatus::Closed);
        assert!(!handle.is_connected());
    }

    #[test]
    fn non_json_text_is_still_sent() {
        let (handle, mut far) = ChannelHandle::detached();
        far.set_status(ConnectionStatus::Open);
        handle.send("hello");
        assert_eq!(far.drain(), vec!["hello".to_string()]);
    }

    #[test]
    fn send_after_far_side_dropped_does_not_panic() {
        let (handle, far) = ChannelHandle::detached();
        far.set_status(ConnectionStatus::Open);
        drop(far);
        handle.send_command(&Command::StopNode("db".into()));
    }

    #[cfg(feature = "net")]
    async fn next(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("event stream ended")
    }

    #[cfg(feature = "net")]
    #[tokio::test]
    async fn round_trip_against_local_server() {
        use crate::config::{ClientConfig, ReconnectPolicy};
        use futures_util::{SinkExt, StreamExt};
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::Message;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"["add",[{"id":"db","depends":[]}]]"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"event":"add"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"["update",[{"id":"db","state":"running"}]]"#.into()))
                .await
                .unwrap();

            let received = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected client message: {other:?}"),
                }
            };
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
            received
        });

        let config = ClientConfig {
            endpoint: format!("ws://{addr}/websocket"),
            reconnect: ReconnectPolicy::disabled(),
            ..ClientConfig::default()
        };
        let (handle, mut events) = Channel::connect(&config);

        assert_eq!(next(&mut events).await, ChannelEvent::Opened { reconnected: false });
        assert!(handle.is_connected());

        match next(&mut events).await {
            ChannelEvent::Frame(frame) => assert_eq!(frame.event, "add"),
            other => panic!("expected add frame, got {other:?}"),
        }
        // The two malformed frames never surface.
        match next(&mut events).await {
            ChannelEvent::Frame(frame) => assert_eq!(frame.event, "update"),
            other => panic!("expected update frame, got {other:?}"),
        }

        handle.send_command(&Command::StartNode("db".into()));

        loop {
            match next(&mut events).await {
                ChannelEvent::Closed { gave_up, .. } => {
                    assert!(gave_up);
                    break;
                }
                ChannelEvent::Error(_) => continue,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(!handle.is_connected());

        let received = server.await.unwrap();
        assert_eq!(received, r#"["startNode","db"]"#);
    }
}
