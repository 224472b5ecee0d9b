//! Minimal WebSocket RPC client for CLI subcommands that talk to an
//! already-running gateway (`sessions`, `send`, `channels`), patterned on
//! the gateway's own handshake contract (`_register` first, then request/
//! response frames) and the teacher's TUI connection loop.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;
use vargos_gateway::rpc::{call_with_timeout, RpcClient};
use vargos_protocol::{parse_frame, serialize_frame, Frame, RequestFrame, ServiceRegistration};

const REGISTER_METHOD: &str = "_register";

/// Connect to `url`, register as an unnamed CLI client, issue one RPC call
/// against `(target, method)`, and return its payload.
pub async fn call(url: &str, target: &str, method: &str, params: Option<Value>) -> Result<Value> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("connecting to gateway at {url}"))?;
    let (mut write, mut read) = stream.split();

    let client = Arc::new(RpcClient::new());
    let registration = ServiceRegistration {
        service: format!("cli-{}", Uuid::new_v4()),
        version: 1,
        methods: Vec::new(),
        events: Vec::new(),
        subscriptions: Vec::new(),
    };
    let (register_frame, register_rx) = client.begin_call(
        "cli",
        REGISTER_METHOD,
        Some(serde_json::to_value(&registration)?),
    );
    let register_id = register_frame.id.clone();
    write
        .send(Message::Text(serialize_frame(&Frame::Request(register_frame))?.into()))
        .await
        .context("sending registration frame")?;

    let (call_frame, call_rx) = client.begin_call(target, method, params);
    let call_id = call_frame.id.clone();

    let reader = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            while let Some(Ok(msg)) = read.next().await {
                let Message::Text(text) = msg else { continue };
                if let Ok(Frame::Response(response)) = parse_frame(&text.to_string()) {
                    client.settle(response);
                }
            }
        }
    });

    call_with_timeout(&client, register_id, register_rx, None)
        .await
        .map_err(|err| anyhow!("registration failed: {err}"))?;

    write
        .send(Message::Text(serialize_frame(&Frame::Request(call_frame))?.into()))
        .await
        .context("sending request frame")?;

    let result = call_with_timeout(&client, call_id, call_rx, None)
        .await
        .map_err(|err| anyhow!("{target}.{method} failed: {err}"));

    let _ = write.send(Message::Close(None)).await;
    reader.abort();
    result
}
