//! Per-WebSocket-connection handler (§4.5, §4.6).
//!
//! Every connection must open with a `_register` request declaring the
//! service's capabilities before any other frame is accepted. After that the
//! connection is a plain frame pump: `Request` routes through
//! [`GatewayState::route_request`], `Response` settles a pending call this
//! gateway forwarded out, and `Event` publishes to the bus.

use std::{sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vargos_protocol::{
    error_codes, parse_frame, serialize_frame, ErrorShape, Frame, MAX_PAYLOAD_BYTES,
};

use crate::state::GatewayState;

const REGISTER_METHOD: &str = "_register";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one accepted WebSocket connection until it closes or the gateway
/// shuts it down. Never panics: malformed frames and handshake failures are
/// reported over the wire (where possible) and the connection is dropped.
pub async fn handle(socket: WebSocket, state: Arc<GatewayState>) {
    let conn_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let writer_conn_id = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(raw) = outbound_rx.recv().await {
            if ws_tx.send(Message::Text(raw.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
        debug!(conn_id = %writer_conn_id, "connection writer task exited");
    });

    let registration = match await_registration(&mut ws_rx).await {
        Ok(registration) => registration,
        Err(message) => {
            let err = ErrorShape::new(error_codes::PROTOCOL_ERROR, message);
            if let Ok(raw) = serialize_frame(&Frame::Response(
                vargos_protocol::ResponseFrame::err("0".to_string(), err),
            )) {
                let _ = outbound_tx.send(raw);
            }
            drop(outbound_tx);
            let _ = writer.await;
            return;
        },
    };

    let cancel = state.register_connection(&conn_id, outbound_tx.clone());
    let service_name = registration.registration.service.clone();
    let subscriptions = registration.registration.subscriptions.clone();

    match state.register_service(&conn_id, registration.registration).await {
        Ok(()) => {
            let ack = serialize_frame(&Frame::Response(vargos_protocol::ResponseFrame::ok(
                registration.request_id,
                serde_json::json!({ "registered": true, "connectionId": conn_id }),
            )));
            if let Ok(raw) = ack {
                let _ = outbound_tx.send(raw);
            }
        },
        Err(err) => {
            let raw = serialize_frame(&Frame::Response(vargos_protocol::ResponseFrame::err(
                registration.request_id,
                err,
            )));
            if let Ok(raw) = raw {
                let _ = outbound_tx.send(raw);
            }
            state.remove_connection(&conn_id).await;
            drop(outbound_tx);
            let _ = writer.await;
            return;
        },
    }

    if !subscriptions.is_empty() {
        state.spawn_event_forwarder(&conn_id, subscriptions);
    }

    info!(conn_id = %conn_id, service = %service_name, "service connection registered");

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                break;
            },
            frame = ws_rx.next() => {
                let Some(frame) = frame else { break };
                let Ok(frame) = frame else { break };
                match frame {
                    Message::Text(text) => {
                        let text = text.to_string();
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id = %conn_id, "dropping oversized frame");
                            continue;
                        }
                        dispatch_text(&conn_id, &text, &state).await;
                    },
                    Message::Binary(bytes) => {
                        if bytes.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id = %conn_id, "dropping oversized frame");
                            continue;
                        }
                        if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                            dispatch_text(&conn_id, &text, &state).await;
                        }
                    },
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => {},
                }
            },
        }
    }

    state.remove_connection(&conn_id).await;
    drop(outbound_tx);
    let _ = writer.await;
    info!(conn_id = %conn_id, "service connection closed");
}

async fn dispatch_text(conn_id: &str, text: &str, state: &Arc<GatewayState>) {
    match parse_frame(text) {
        Ok(Frame::Request(request)) => {
            state.route_request(conn_id, request).await;
        },
        Ok(Frame::Response(response)) => {
            state.settle_response(response);
        },
        Ok(Frame::Event(event)) => {
            state.publish(&event.source, &event.event, event.payload);
        },
        Err(err) => {
            warn!(conn_id, %err, "dropping malformed frame");
        },
    }
}

struct PendingRegistration {
    request_id: String,
    registration: vargos_protocol::ServiceRegistration,
}

/// Wait for the handshake: the first frame must be a `Request` naming
/// `_register` within [`HANDSHAKE_TIMEOUT`], whose `params` deserialize to a
/// [`vargos_protocol::ServiceRegistration`].
async fn await_registration(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
) -> Result<PendingRegistration, String> {
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, ws_rx.next())
        .await
        .map_err(|_| "handshake timed out".to_string())?
        .ok_or_else(|| "connection closed before handshake".to_string())?
        .map_err(|err| format!("websocket error during handshake: {err}"))?;

    let text = match first {
        Message::Text(text) => text.to_string(),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|_| "handshake frame is not valid UTF-8".to_string())?,
        _ => return Err("handshake frame must be a text request".to_string()),
    };

    let frame = parse_frame(&text).map_err(|err| format!("malformed handshake frame: {err}"))?;
    let Frame::Request(request) = frame else {
        return Err("first frame must be a request".to_string());
    };
    if request.method != REGISTER_METHOD {
        return Err(format!("expected '{REGISTER_METHOD}' method, got '{}'", request.method));
    }

    let params = request
        .params
        .ok_or_else(|| "'_register' request missing params".to_string())?;
    let registration: vargos_protocol::ServiceRegistration =
        serde_json::from_value(params).map_err(|err| format!("invalid registration payload: {err}"))?;

    Ok(PendingRegistration {
        request_id: request.id,
        registration,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use vargos_protocol::RequestFrame;
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

    fn state() -> Arc<GatewayState> {
        Arc::new(GatewayState::new(
            Arc::new(EventBus::new()),
            Arc::new(SessionQueue::new(Arc::new(NoopStarter))),
            Arc::new(Services::default()),
        ))
    }

    #[tokio::test]
    async fn dispatch_text_routes_a_request_to_local_dispatch() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.register_connection("caller", tx);

        let request = RequestFrame {
            id: Uuid::new_v4().to_string(),
            target: "sessions".into(),
            method: "list".into(),
            params: None,
        };
        let raw = serialize_frame(&Frame::Request(request)).unwrap();
        dispatch_text("caller", &raw, &state).await;

        let response = rx.recv().await.expect("should receive a response");
        assert!(response.contains("\"ok\":true"));
    }

    #[tokio::test]
    async fn dispatch_text_ignores_malformed_json() {
        let state = state();
        dispatch_text("caller", "not json", &state).await;
    }
}
