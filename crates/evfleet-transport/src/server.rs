//! Central-system side WebSocket handshake

use crate::{
    error::{TransportError, TransportResult},
    utils, TransportConfig,
};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue, StatusCode},
    },
    WebSocketStream,
};
use tracing::{debug, warn};

/// A completed server handshake
pub struct Accepted<S> {
    /// Station identifier taken from the request path
    pub station_id: String,
    /// Subprotocol echoed back, if the client offered it
    pub sub_protocol: Option<String>,
    pub socket: WebSocketStream<S>,
}

#[derive(Debug, Default)]
struct HandshakeInfo {
    station_id: String,
    sub_protocol: Option<String>,
}

/// Run the server handshake on an accepted stream.
///
/// Requests whose path carries no station identifier are answered with
/// HTTP 400. The configured subprotocol is echoed when offered.
pub async fn accept<S>(stream: S, config: &TransportConfig) -> TransportResult<Accepted<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let captured: Arc<Mutex<Option<HandshakeInfo>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&captured);
    let sub_protocol = config.sub_protocol.clone();

    let callback = move |request: &Request, mut response: Response| {
        let path = request.uri().path();
        let Some(station_id) = utils::station_id_from_path(path) else {
            warn!("Rejecting handshake without station id: {}", path);
            let mut rejection = ErrorResponse::new(Some("station id missing from path".into()));
            *rejection.status_mut() = StatusCode::BAD_REQUEST;
            return Err(rejection);
        };

        let offered = request
            .headers()
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| utils::offers_subprotocol(value, &sub_protocol));

        let mut echoed = None;
        if offered {
            if let Ok(value) = HeaderValue::from_str(&sub_protocol) {
                response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                echoed = Some(sub_protocol.clone());
            }
        } else {
            debug!("Client {} did not offer {}", station_id, sub_protocol);
        }

        if let Ok(mut slot) = slot.lock() {
            *slot = Some(HandshakeInfo {
                station_id: station_id.to_string(),
                sub_protocol: echoed,
            });
        }
        Ok(response)
    };

    let socket = timeout(
        config.connection_timeout,
        accept_hdr_async_with_config(stream, callback, Some(config.websocket_config())),
    )
    .await
    .map_err(|_| TransportError::Timeout {
        timeout_secs: config.connection_timeout.as_secs(),
    })?
    .map_err(|e| TransportError::handshake(e.to_string()))?;

    let info = captured
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
        .ok_or_else(|| TransportError::handshake("handshake completed without request data"))?;

    Ok(Accepted {
        station_id: info.station_id,
        sub_protocol: info.sub_protocol,
        socket,
    })
}
