//! Station-side WebSocket connection

use crate::{
    error::{TransportError, TransportResult},
    tls::ClientTls,
    utils, TransportConfig,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
    },
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

/// Socket type returned by [`connect`]
pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket to `url`, offering the configured subprotocol.
///
/// `wss://` URLs go through a native-tls connector built from `tls`.
pub async fn connect(
    url: &str,
    config: &TransportConfig,
    tls: &ClientTls,
) -> TransportResult<ClientSocket> {
    info!("Connecting to central system at {}", url);

    let url = Url::parse(url)?;
    let connector = match url.scheme() {
        "wss" => Some(Connector::NativeTls(tls.connector()?)),
        "ws" => None,
        other => {
            return Err(TransportError::InvalidUrl {
                message: format!("unsupported scheme {}", other),
            })
        }
    };

    let mut request = url.as_str().into_client_request()?;
    let protocol = HeaderValue::from_str(&config.sub_protocol)
        .map_err(|e| TransportError::handshake(format!("invalid subprotocol: {}", e)))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);

    let (socket, response) = timeout(
        config.connection_timeout,
        connect_async_tls_with_config(request, Some(config.websocket_config()), false, connector),
    )
    .await
    .map_err(|_| TransportError::Timeout {
        timeout_secs: config.connection_timeout.as_secs(),
    })?
    .map_err(TransportError::from)?;

    let negotiated = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok());
    match negotiated {
        Some(protocol) if utils::offers_subprotocol(protocol, &config.sub_protocol) => {
            debug!("Negotiated subprotocol {}", protocol)
        }
        _ => warn!(
            "Server did not confirm subprotocol {}, continuing",
            config.sub_protocol
        ),
    }

    info!("WebSocket connection established");
    Ok(socket)
}
