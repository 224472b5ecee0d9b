//! Routes a `Request` whose target is not an externally registered service
//! to the Gateway's built-in domain services (§10 of the full
//! specification — a minimal, always-available surface for sessions,
//! agent control, channels, cron, and system health).

use serde_json::Value;
use vargos_protocol::{error_codes, ErrorShape, RequestFrame, ResponseFrame};
use vargos_service_traits::Services;

fn session_key_param(params: &Option<Value>) -> Result<String, ErrorShape> {
    params
        .as_ref()
        .and_then(|p| p.get("sessionKey"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ErrorShape::new(error_codes::VALIDATION, "missing 'sessionKey' parameter"))
}

/// Dispatch `request` to the local services bundle, defaulting to
/// `SERVICE_UNAVAILABLE` for targets/methods this gateway does not expose
/// locally (an RPC client should not be able to distinguish "no remote
/// service registered" from "no local fallback" — both are simply
/// unavailable).
pub async fn dispatch(services: &Services, request: RequestFrame) -> ResponseFrame {
    let RequestFrame {
        id,
        target,
        method,
        params,
    } = request;

    let result: Result<Value, ErrorShape> = match (target.as_str(), method.as_str()) {
        ("agent", "run") => services.agent.run(params.unwrap_or(Value::Null)).await.map_err(Into::into),
        ("agent", "run_wait") => services
            .agent
            .run_wait(params.unwrap_or(Value::Null))
            .await
            .map_err(Into::into),
        ("agent", "cancel") => match session_key_param(&params) {
            Ok(key) => services.agent.cancel(&key).await.map_err(Into::into),
            Err(err) => Err(err),
        },
        ("agent", "active_session_keys") => {
            Ok(serde_json::json!(services.agent.active_session_keys().await))
        },
        ("sessions", "list") => services.session.list().await.map_err(Into::into),
        ("sessions", "history") => match session_key_param(&params) {
            Ok(key) => services.session.history(&key).await.map_err(Into::into),
            Err(err) => Err(err),
        },
        ("sessions", "append_message") => match session_key_param(&params) {
            Ok(key) => {
                let message = params
                    .as_ref()
                    .and_then(|p| p.get("message"))
                    .cloned()
                    .unwrap_or(Value::Null);
                services.session.append_message(&key, message).await.map_err(Into::into)
            },
            Err(err) => Err(err),
        },
        ("sessions", "delete") => match session_key_param(&params) {
            Ok(key) => services.session.delete(&key).await.map_err(Into::into),
            Err(err) => Err(err),
        },
        ("channels", "status") => services.channel.status().await.map_err(Into::into),
        ("channels", "send") => services
            .channel
            .send(params.unwrap_or(Value::Null))
            .await
            .map_err(Into::into),
        ("cron", "list") => services.cron.list().await.map_err(Into::into),
        ("cron", "add") => services.cron.add(params.unwrap_or(Value::Null)).await.map_err(Into::into),
        ("cron", "remove") => match request_string_param(&params, "triggerId") {
            Ok(trigger_id) => services.cron.remove(&trigger_id).await.map_err(Into::into),
            Err(err) => Err(err),
        },
        ("memory", "search") => match request_string_param(&params, "query") {
            Ok(query) => services.memory.search(&query).await.map_err(Into::into),
            Err(err) => Err(err),
        },
        ("memory", "store") => services
            .memory
            .store(params.unwrap_or(Value::Null))
            .await
            .map_err(Into::into),
        ("system", "health") => services.system_info.health().await.map_err(Into::into),
        _ => {
            return ResponseFrame::err(
                id,
                ErrorShape::new(
                    error_codes::SERVICE_UNAVAILABLE,
                    format!("no service registered for target '{target}'"),
                ),
            );
        },
    };

    match result {
        Ok(payload) => ResponseFrame::ok(id, payload),
        Err(err) => ResponseFrame::err(id, err),
    }
}

fn request_string_param(params: &Option<Value>, field: &str) -> Result<String, ErrorShape> {
    params
        .as_ref()
        .and_then(|p| p.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ErrorShape::new(error_codes::VALIDATION, format!("missing '{field}' parameter")))
}
