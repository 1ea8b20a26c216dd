//! Accept loop and HTTP surface of the central system

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::metrics::ServerMetrics;
use crate::registry::SessionRegistry;
use crate::relay::{HttpRelay, RelayQueue, RelaySink};
use crate::session::{run_session, SessionContext};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// The central system: WebSocket listener, session registry and relay
pub struct CsmsServer {
    config: ServerConfig,
    listener: TcpListener,
    metrics_listener: Option<TcpListener>,
    tls: Option<tokio_native_tls::TlsAcceptor>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<ServerMetrics>,
    sink: Arc<dyn RelaySink>,
}

impl CsmsServer {
    /// Bind the configured ports, relaying to the configured HTTP sink
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let sink = HttpRelay::new(config.relay_base_url.clone(), config.relay_timeout())
            .map_err(|e| ServerError::configuration(e.to_string()))?;
        Self::bind_with_sink(config, Arc::new(sink)).await
    }

    /// Bind the configured ports with a custom relay sink
    pub async fn bind_with_sink(
        config: ServerConfig,
        sink: Arc<dyn RelaySink>,
    ) -> ServerResult<Self> {
        config.validate().map_err(ServerError::configuration)?;

        let tls = match config.tls() {
            Some(tls) => Some(tls.acceptor()?),
            None => None,
        };
        let listener = TcpListener::bind(config.ws_addr()?).await?;
        let metrics_listener = match config.metrics_addr()? {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        Ok(Self {
            config,
            listener,
            metrics_listener,
            tls,
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(ServerMetrics::new()?),
            sink,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Accept stations until `cancel` fires. On shutdown every session is
    /// closed and the relay backlog is flushed before returning.
    pub async fn run(self, cancel: CancellationToken) -> ServerResult<()> {
        let scheme = if self.tls.is_some() { "wss" } else { "ws" };
        info!("Server started: {}://{}", scheme, self.local_addr()?);

        let sessions = TaskTracker::new();
        let relay_workers = TaskTracker::new();
        let relay = RelayQueue::start(
            self.sink.clone(),
            self.config.relay_workers,
            self.config.relay_queue_depth,
            self.metrics.clone(),
            &relay_workers,
        );
        let ctx = Arc::new(SessionContext {
            registry: self.registry.clone(),
            relay,
            metrics: self.metrics.clone(),
            transport: self.config.transport(),
        });

        if let Some(listener) = self.metrics_listener {
            let router = http_router(HttpState {
                registry: self.registry.clone(),
                metrics: self.metrics.clone(),
            });
            let shutdown = cancel.clone();
            sessions.spawn(async move {
                info!("Metrics endpoint on {:?}", listener.local_addr().ok());
                if let Err(e) = axum::serve(listener, router)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
                {
                    error!("Metrics server error: {}", e);
                }
            });
        }

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                },
            };

            let ctx = ctx.clone();
            let tls = self.tls.clone();
            let cancel = cancel.clone();
            sessions.spawn(async move { serve_connection(ctx, stream, peer, tls, cancel).await });
        }

        info!("Shutting down, closing {} sessions", self.registry.len());
        self.registry.close_all();
        sessions.close();
        sessions.wait().await;

        // Last queue handle; workers exit once the backlog is delivered.
        drop(ctx);
        relay_workers.close();
        relay_workers.wait().await;

        info!("Server stopped");
        Ok(())
    }
}

async fn serve_connection(
    ctx: Arc<SessionContext>,
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<tokio_native_tls::TlsAcceptor>,
    cancel: CancellationToken,
) {
    let Some(acceptor) = tls else {
        return serve_stream(ctx, stream, peer, cancel).await;
    };

    let handshake = tokio::time::timeout(ctx.transport.connection_timeout, acceptor.accept(stream));
    match handshake.await {
        Ok(Ok(stream)) => serve_stream(ctx, stream, peer, cancel).await,
        Ok(Err(e)) => warn!("TLS handshake with {} failed: {}", peer, e),
        Err(_) => warn!("TLS handshake with {} timed out", peer),
    }
}

async fn serve_stream<S>(
    ctx: Arc<SessionContext>,
    stream: S,
    peer: SocketAddr,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match evfleet_transport::accept(stream, &ctx.transport).await {
        Ok(accepted) => {
            run_session(ctx, accepted, Some(peer), &cancel).await;
        }
        Err(e) => warn!("WebSocket handshake with {} failed: {}", peer, e),
    }
}

#[derive(Clone)]
struct HttpState {
    registry: Arc<SessionRegistry>,
    metrics: Arc<ServerMetrics>,
}

fn http_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HttpState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.registry.station_ids(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> HttpState {
        HttpState {
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(ServerMetrics::new().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let state = state();
        state.metrics.record_frame();
        let response = http_router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("evfleet_server_frames_received_total 1"));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            relay_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            CsmsServer::bind(config).await,
            Err(ServerError::Configuration { .. })
        ));
    }
}
