//! One connection lifecycle to one relay endpoint.
//!
//! A [`RelayLink`] is opened with a bounded connect timeout, sends frames,
//! and hands out [`ReceiveWindow`]s: finite, non-restartable sequences of
//! inbound frames that end at the window deadline, after an idle read
//! timeout, or when the connection closes.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use ribbon_shared::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_RESPONSE_WINDOW_SECS,
    DEFAULT_VERIFY_WINDOW_SECS,
};
use ribbon_shared::protocol::{InboundFrame, OutboundFrame};

use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake so teardown never stalls a caller.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout parameters for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimeouts {
    /// Bound on establishing the connection.
    pub connect: Duration,
    /// Longest gap between two inbound frames before a window ends.
    pub read: Duration,
    /// Duration of the post-publish response window.
    pub response_window: Duration,
    /// Duration of the storage verification window.
    pub verify_window: Duration,
}

impl Default for RelayTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            response_window: Duration::from_secs(DEFAULT_RESPONSE_WINDOW_SECS),
            verify_window: Duration::from_secs(DEFAULT_VERIFY_WINDOW_SECS),
        }
    }
}

/// A relay URL plus its timeouts. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub url: String,
    pub timeouts: RelayTimeouts,
}

impl RelayEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeouts: RelayTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: RelayTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// An open connection to one relay.
pub struct RelayLink {
    url: String,
    read_timeout: Duration,
    stream: Option<WsStream>,
}

impl RelayLink {
    /// Connect to `endpoint`, failing if the handshake does not finish in time.
    pub async fn open(endpoint: &RelayEndpoint) -> Result<Self, TransportError> {
        let connect_timeout = endpoint.timeouts.connect;
        let (stream, _response) =
            tokio::time::timeout(connect_timeout, connect_async(endpoint.url.as_str()))
                .await
                .map_err(|_| TransportError::ConnectTimeout(connect_timeout))?
                .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(relay = %endpoint.url, "Connected to relay");

        Ok(Self {
            url: endpoint.url.clone(),
            read_timeout: endpoint.timeouts.read,
            stream: Some(stream),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one frame.
    pub async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let text = frame.encode()?;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        if let Err(e) = stream.send(Message::Text(text)).await {
            self.stream = None;
            return Err(TransportError::Send(e.to_string()));
        }
        trace!(relay = %self.url, "Frame sent");
        Ok(())
    }

    /// Frames arriving within `window` from now.
    pub fn receive_window(&mut self, window: Duration) -> ReceiveWindow<'_> {
        ReceiveWindow {
            deadline: Instant::now() + window,
            finished: !self.is_open(),
            link: self,
        }
    }

    /// Release the connection. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.close(None)).await;
            debug!(relay = %self.url, "Closed relay connection");
        }
    }
}

/// A bounded, one-shot sequence of inbound frames.
pub struct ReceiveWindow<'a> {
    link: &'a mut RelayLink,
    deadline: Instant,
    finished: bool,
}

impl ReceiveWindow<'_> {
    /// Next decodable frame, or `None` once the window has ended.
    ///
    /// Undecodable frames are skipped. Once `None` is returned every later
    /// call returns `None` as well.
    pub async fn next(&mut self) -> Option<InboundFrame> {
        loop {
            if self.finished {
                return None;
            }
            let now = Instant::now();
            if now >= self.deadline {
                self.finished = true;
                return None;
            }
            let read_deadline = self.deadline.min(now + self.link.read_timeout);

            let Some(stream) = self.link.stream.as_mut() else {
                self.finished = true;
                return None;
            };

            match tokio::time::timeout_at(read_deadline, stream.next()).await {
                Err(_) => {
                    trace!(relay = %self.link.url, "Receive window idle, ending");
                    self.finished = true;
                    return None;
                }
                Ok(None) | Ok(Some(Ok(Message::Close(_)))) => {
                    debug!(relay = %self.link.url, "Relay closed the connection");
                    self.link.stream = None;
                    self.finished = true;
                    return None;
                }
                Ok(Some(Err(e))) => {
                    debug!(relay = %self.link.url, error = %e, "Relay read error");
                    self.link.stream = None;
                    self.finished = true;
                    return None;
                }
                Ok(Some(Ok(Message::Text(text)))) => match InboundFrame::decode(&text) {
                    Ok(frame) => return Some(frame),
                    Err(e) => {
                        debug!(relay = %self.link.url, error = %e, "Skipping undecodable frame");
                    }
                },
                Ok(Some(Ok(_))) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockRelay, RelayBehavior};

    fn fast_endpoint(url: String) -> RelayEndpoint {
        RelayEndpoint::new(url).with_timeouts(RelayTimeouts {
            connect: Duration::from_secs(2),
            read: Duration::from_millis(300),
            response_window: Duration::from_millis(800),
            verify_window: Duration::from_millis(800),
        })
    }

    #[tokio::test]
    async fn test_open_unreachable_fails() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = fast_endpoint(format!("ws://{addr}"));
        assert!(RelayLink::open(&endpoint).await.is_err());
    }

    #[tokio::test]
    async fn test_window_ends_on_idle_and_is_not_restartable() {
        let relay = MockRelay::spawn(RelayBehavior::silent()).await;
        let mut link = RelayLink::open(&fast_endpoint(relay.url())).await.unwrap();

        let started = Instant::now();
        let mut window = link.receive_window(Duration::from_secs(5));
        assert!(window.next().await.is_none());
        assert!(window.next().await.is_none());
        // Idle read timeout, not the 5s window, ended it.
        assert!(started.elapsed() < Duration::from_secs(2));

        link.close().await;
        link.close().await;
        assert!(!link.is_open());
        assert!(link.send(&OutboundFrame::Close {
            subscription_id: "x".into()
        })
        .await
        .is_err());
    }

    #[tokio::test]
    async fn test_window_yields_frames_then_ends() {
        let relay = MockRelay::spawn(RelayBehavior::honest()).await;
        let mut link = RelayLink::open(&fast_endpoint(relay.url())).await.unwrap();

        link.send(&OutboundFrame::Subscribe {
            subscription_id: "s1".into(),
            filter: Default::default(),
        })
        .await
        .unwrap();

        let mut window = link.receive_window(Duration::from_secs(2));
        assert_eq!(
            window.next().await,
            Some(InboundFrame::End {
                subscription_id: "s1".into()
            })
        );
        assert!(window.next().await.is_none());
        link.close().await;
    }
}
