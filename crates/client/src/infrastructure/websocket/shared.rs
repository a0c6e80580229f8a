//! Endpoint helpers for the live-update WebSocket.

use url::Url;

use crate::ports::outbound::ChannelError;
use crate::queue_types::StreamId;

const STREAM_QUERY_KEY: &str = "streamId";

/// `{ws_base}/ws?streamId={id}`, with the id percent-encoded.
pub fn stream_url(ws_base: &str, stream_id: &StreamId) -> Result<Url, ChannelError> {
    let base = ws_base.trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}/ws"))
        .map_err(|e| ChannelError::InvalidUrl(format!("{ws_base}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChannelError::InvalidUrl(format!(
            "{ws_base}: expected ws:// or wss://"
        )));
    }
    url.query_pairs_mut()
        .append_pair(STREAM_QUERY_KEY, stream_id.as_str());
    Ok(url)
}
