//! Classification of inbound WebSocket messages

use crate::{
    error::{TransportError, TransportResult},
    TransportConfig,
};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// What a read loop should do with a received socket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame to hand to the frame parser
    Text(String),
    /// Control or unsupported traffic, nothing to do
    Skip,
}

/// Sort a received message into text to process or traffic to skip.
///
/// A close frame ends the session and is reported as
/// [`TransportError::ConnectionClosed`]. Pings are answered by tungstenite
/// itself on the next write.
pub fn classify(message: Message, config: &TransportConfig) -> TransportResult<Inbound> {
    match message {
        Message::Text(text) => {
            if text.len() > config.max_message_size {
                return Err(TransportError::MessageTooLarge {
                    size: text.len(),
                    limit: config.max_message_size,
                });
            }
            Ok(Inbound::Text(text))
        }
        Message::Binary(data) => {
            warn!("Ignoring binary message of {} bytes", data.len());
            Ok(Inbound::Skip)
        }
        Message::Ping(_) | Message::Pong(_) => {
            debug!("Control frame received");
            Ok(Inbound::Skip)
        }
        Message::Close(frame) => {
            info!("Received close frame: {:?}", frame);
            Err(TransportError::closed(
                frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "peer closed".to_string()),
            ))
        }
        Message::Frame(_) => Ok(Inbound::Skip),
    }
}

/// Wrap encoded frame text for the socket
pub fn text_message(text: String) -> Message {
    Message::Text(text)
}
