//! WebSocket live channel using tokio-tungstenite

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::infrastructure::websocket::shared::stream_url;
use crate::ports::outbound::{
    ChannelError, ChannelEvent, LiveChannel, LiveChannelConnector, CLOSE_NO_STATUS,
};
use crate::queue_types::StreamId;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `{ws_base}/ws?streamId=...` connections.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    ws_base_url: String,
}

impl TungsteniteConnector {
    pub fn new(ws_base_url: &str) -> Self {
        Self {
            ws_base_url: ws_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LiveChannelConnector for TungsteniteConnector {
    async fn connect(&self, stream_id: &StreamId) -> Result<Box<dyn LiveChannel>, ChannelError> {
        let url = stream_url(&self.ws_base_url, stream_id)?;
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectFailed(format!("{url}: {e}")))?;
        tracing::debug!(stream_id = %stream_id, url = %url, "WebSocket handshake complete");

        Ok(Box::new(TungsteniteChannel {
            ws,
            finished: false,
        }))
    }
}

pub struct TungsteniteChannel {
    ws: WsStream,
    finished: bool,
}

#[async_trait]
impl LiveChannel for TungsteniteChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.finished {
            return None;
        }

        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(ChannelEvent::Text(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(ChannelEvent::Text(text)),
                    Err(_) => tracing::debug!("Ignoring non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    self.finished = true;
                    return Some(ChannelEvent::Closed {
                        code: close_code(frame.as_ref()),
                    });
                }
                // Ping/pong are answered by tungstenite itself
                Ok(_) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(ChannelEvent::Error(e.to_string()));
                }
            }
        }

        self.finished = true;
        None
    }

    async fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
    }
}

fn close_code(frame: Option<&CloseFrame<'_>>) -> u16 {
    frame.map_or(CLOSE_NO_STATUS, |frame| u16::from(frame.code))
}
