//! Subscriber channel client.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::ClientError;
use crate::objects::WsServerMessage;

/// A connected subscriber.
///
/// The first message yielded by [`next_message`](Self::next_message) is
/// always the admission snapshot.
pub struct SubscriberClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    close_frame: Option<CloseFrame<'static>>,
}

impl SubscriberClient {
    /// Connect to `url` (`ws://` or `wss://`).
    pub async fn connect(url: &Url) -> Result<Self, ClientError> {
        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(Self {
            stream,
            close_frame: None,
        })
    }

    /// Wait for the next server message.
    ///
    /// Returns `None` once the server closes the connection; the close
    /// frame, if any, is then available from [`close_frame`](Self::close_frame).
    pub async fn next_message(&mut self) -> Option<Result<WsServerMessage, ClientError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };
            match frame {
                Message::Text(text) => {
                    return Some(serde_json::from_str(&text).map_err(ClientError::Json));
                }
                Message::Binary(_) => return Some(Err(ClientError::UnexpectedBinary)),
                Message::Close(frame) => {
                    self.close_frame = frame;
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    /// The close frame received from the server, if the server closed.
    pub fn close_frame(&self) -> Option<&CloseFrame<'static>> {
        self.close_frame.as_ref()
    }

    /// Send a text frame. The server ignores it; useful for keepalive tests.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
