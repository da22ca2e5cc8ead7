//! Gateway WebSocket Server
//!
//! axum server accepting client WebSockets at `/ws`. Each socket gets a
//! writer task draining its hub queue; the socket's read loop feeds client
//! frames to the [`Gateway`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::service::Gateway;

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    cancel: CancellationToken,
}

/// WebSocket server for downstream clients.
pub struct GatewayServer {
    port: u16,
    gateway: Arc<Gateway>,
    cancel: CancellationToken,
}

impl GatewayServer {
    /// Create a server on `port`.
    #[must_use]
    pub const fn new(port: u16, gateway: Arc<Gateway>, cancel: CancellationToken) -> Self {
        Self {
            port,
            gateway,
            cancel,
        }
    }

    /// Bind `0.0.0.0:port` and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `GatewayServerError` if binding fails or the server stops
    /// with an error.
    pub async fn run(self) -> Result<(), GatewayServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `GatewayServerError::ServerFailed` if the server stops with
    /// an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), GatewayServerError> {
        let state = AppState {
            gateway: self.gateway,
            cancel: self.cancel.clone(),
        };
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(state);

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "gateway listening");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| GatewayServerError::ServerFailed(e.to_string()))?;

        tracing::info!("gateway stopped");
        Ok(())
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client, mut outbound) = state.gateway.connect_client();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        client,
                        error = %e,
                        kind = frame.kind(),
                        "failed to encode frame"
                    );
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => state.gateway.handle_text(client, text.as_str()),
                Some(Ok(Message::Binary(_))) => state.gateway.handle_binary(client),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    tracing::debug!(client, error = %e, "client socket error");
                    break;
                }
            },
        }
    }

    // Closing the hub queue ends the writer
    state.gateway.disconnect_client(client);
    let _ = writer.await;
}

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
