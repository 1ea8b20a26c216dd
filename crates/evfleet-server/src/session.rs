//! Per-connection read loop

use crate::dispatch::{self, Dispatched};
use crate::metrics::ServerMetrics;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::relay::RelayQueue;
use evfleet_transport::{classify, text_message, Accepted, Inbound, TransportConfig};
use evfleet_types::Frame;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared by every session
pub struct SessionContext {
    pub registry: Arc<SessionRegistry>,
    pub relay: RelayQueue,
    pub metrics: Arc<ServerMetrics>,
    pub transport: TransportConfig,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The station closed the socket
    Closed,
    /// Replaced by a newer connection or server shutdown
    Cancelled,
    /// Transport failure
    Failed(String),
}

/// Serve one accepted connection until it closes.
///
/// The session is registered under its station id, replacing any older
/// entry, and removed again on exit only if it is still the current entry.
pub async fn run_session<S>(
    ctx: Arc<SessionContext>,
    accepted: Accepted<S>,
    peer: Option<SocketAddr>,
    shutdown: &CancellationToken,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let station_id = accepted.station_id;
    let mut socket = accepted.socket;
    let cancel = shutdown.child_token();
    let handle = SessionHandle::new(peer, cancel.clone());
    let connection_id = handle.connection_id;

    info!(
        "Client connected: {} from {} ({})",
        station_id,
        peer.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string()),
        connection_id
    );
    if let Some(old) = ctx.registry.register(&station_id, handle) {
        info!(
            "Connection {} replaces {} for {}",
            connection_id, old.connection_id, station_id
        );
    }
    ctx.metrics.set_active_sessions(ctx.registry.len());

    let cleanup_ctx = ctx.clone();
    let cleanup_station = station_id.clone();
    let cleanup = scopeguard::guard(connection_id, move |id| {
        if cleanup_ctx.registry.remove_if_current(&cleanup_station, id) {
            debug!("Removed {} from registry", cleanup_station);
        }
        cleanup_ctx
            .metrics
            .set_active_sessions(cleanup_ctx.registry.len());
        info!("Client disconnected: {} ({})", cleanup_station, id);
    });

    let end = loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            message = socket.next() => message,
        };

        let message = match message {
            None => break SessionEnd::Closed,
            Some(Err(e)) => break SessionEnd::Failed(e.to_string()),
            Some(Ok(message)) => message,
        };

        let text = match classify(message, &ctx.transport) {
            Ok(Inbound::Text(text)) => text,
            Ok(Inbound::Skip) => continue,
            Err(e) if e.is_closed() => break SessionEnd::Closed,
            Err(e) => break SessionEnd::Failed(e.to_string()),
        };

        if let Err(e) = handle_frame(&ctx, &station_id, &mut socket, &text).await {
            break SessionEnd::Failed(e);
        }
    };

    if end != SessionEnd::Closed {
        if let Err(e) = socket.close(None).await {
            debug!("Close for {} failed: {}", station_id, e);
        }
    }
    match &end {
        SessionEnd::Failed(reason) => warn!("Session {} ended: {}", station_id, reason),
        other => debug!("Session {} ended: {:?}", station_id, other),
    }

    drop(cleanup);
    end
}

/// Answer one text frame. Only a failed send is an error.
async fn handle_frame<S>(
    ctx: &SessionContext,
    station_id: &str,
    socket: &mut WebSocketStream<S>,
    text: &str,
) -> Result<(), String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ctx.metrics.record_frame();

    match dispatch::handle_text(station_id, text, chrono::Utc::now()) {
        Ok(Dispatched::Reply {
            action,
            reply,
            relay,
        }) => {
            ctx.metrics.record_call(action.as_str());
            socket
                .send(text_message(Frame::from(reply).to_text()))
                .await
                .map_err(|e| e.to_string())?;
            info!("[{}] processed {}", station_id, action);

            if let Some(event) = relay {
                ctx.relay.enqueue(event);
            }
        }
        Ok(Dispatched::Ignored) => {}
        Err(e) => {
            ctx.metrics.record_malformed();
            warn!("Message processing error: {} - {}", station_id, e);
        }
    }
    Ok(())
}
