use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// What the read loop cares about from the socket. Pings from the peer are
/// answered by the transport and never surface here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    Pong,
    Closed,
}

#[async_trait]
pub trait SocketStream: Send {
    /// Must be cancel-safe: the read loop races it against shutdown and the
    /// pong deadline.
    async fn next_frame(&mut self) -> Result<SocketFrame, TransportError>;
    async fn send_ping(&mut self) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn SocketStream>, TransportError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn SocketStream>, TransportError> {
        let (inner, response) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        debug!(
            event_name = "ingress.slack.socket_opened",
            status = %response.status(),
            "websocket handshake completed"
        );
        Ok(Box::new(TungsteniteSocket { inner }))
    }
}

pub struct TungsteniteSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketStream for TungsteniteSocket {
    async fn next_frame(&mut self) -> Result<SocketFrame, TransportError> {
        loop {
            let Some(message) = self.inner.next().await else {
                return Ok(SocketFrame::Closed);
            };

            match message.map_err(|error| TransportError::Receive(error.to_string()))? {
                Message::Text(text) => return Ok(SocketFrame::Text(text.as_str().to_owned())),
                Message::Pong(_) => return Ok(SocketFrame::Pong),
                Message::Close(frame) => {
                    debug!(
                        event_name = "ingress.slack.close_frame",
                        reason = ?frame,
                        "peer sent close frame"
                    );
                    return Ok(SocketFrame::Closed);
                }
                Message::Ping(_) | Message::Binary(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.inner
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|error| TransportError::Send(error.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.inner.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(error) => Err(TransportError::Disconnect(error.to_string())),
        }
    }
}
