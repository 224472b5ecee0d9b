//! HTTP/WebSocket server surface (§4.5): one upgrade route for service
//! connections plus a liveness endpoint.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::{connection, state::GatewayState};

/// Build the router. Exposed separately from [`run`] so integration tests
/// can drive it against an in-memory or locally bound listener without going
/// through process lifecycle.
#[must_use]
pub fn build_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle(socket, state))
}

async fn healthz(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "connections": state.connection_count(),
    }))
}

/// Bind `addr` and serve until `state.shutdown` is cancelled, then stop
/// accepting new connections and let in-flight ones drain.
pub async fn run(addr: std::net::SocketAddr, state: Arc<GatewayState>) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_app(state);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use vargos_service_traits::Services;

    use super::*;
    use crate::{event_bus::EventBus, session_queue::SessionQueue};

    struct NoopStarter;

    #[async_trait::async_trait]
    impl crate::session_queue::RunStarter for NoopStarter {
        async fn start_run(
            &self,
            _message: crate::session_queue::QueuedMessage,
            _cancel: Arc<tokio::sync::Notify>,
        ) {
        }
    }

    #[tokio::test]
    async fn healthz_reports_connection_count() {
        let state = Arc::new(GatewayState::new(
            Arc::new(EventBus::new()),
            Arc::new(SessionQueue::new(Arc::new(NoopStarter))),
            Arc::new(Services::default()),
        ));
        let body = healthz(State(state)).await.0;
        assert_eq!(body["ok"], true);
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn build_app_binds_a_real_listener() {
        let state = Arc::new(GatewayState::new(
            Arc::new(EventBus::new()),
            Arc::new(SessionQueue::new(Arc::new(NoopStarter))),
            Arc::new(Services::default()),
        ));
        let app = build_app(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await
        });
        server.abort();
    }
}
