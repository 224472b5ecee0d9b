//! Cron trigger scheduling, wired as both a `CronService` management
//! surface (add/list/remove over RPC, §6) and an independent background
//! ticker that is the Gateway's third inbound producer alongside channel
//! adapters and CLI clients (§1, §2, §5).
//!
//! The ticker owns no lock shared with the inbound pipeline or session
//! queue beyond the trigger map itself: firing a due trigger enqueues into
//! the same `SessionQueue::enqueue` path a channel adapter's debounced
//! flush would, so queue-mode arbitration (§4.9) applies identically to
//! cron-originated messages.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use vargos_cron::{CronSchedule, CronTrigger};
use vargos_service_traits::{CronService, ServiceError, ServiceResult};

use crate::session_queue::{QueuedMessage, SessionQueue};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// In-memory trigger store and scheduler. The Gateway is agnostic to
/// whether trigger definitions themselves are persisted (spec.md §1 Out of
/// scope covers persistent storage generally); this is the in-memory
/// collaborator the Gateway runs with standalone.
pub struct GatewayCronService {
    triggers: DashMap<String, CronTrigger>,
}

impl Default for GatewayCronService {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayCronService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggers: DashMap::new(),
        }
    }

    /// Spawn the ticker that checks every registered trigger once per
    /// `TICK_INTERVAL` and enqueues the due ones. Runs until `cancel` fires.
    pub fn spawn_ticker(
        self: &Arc<Self>,
        session_queue: Arc<SessionQueue>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(TICK_INTERVAL) => {},
                }
                service.fire_due(&session_queue).await;
            }
        })
    }

    async fn fire_due(&self, session_queue: &Arc<SessionQueue>) {
        let now_ms = now_ms();
        let due: Vec<CronTrigger> = self
            .triggers
            .iter()
            .filter(|entry| entry.value().is_due(now_ms))
            .map(|entry| entry.value().clone())
            .collect();

        for mut trigger in due {
            session_queue
                .enqueue(QueuedMessage {
                    session_key: trigger.session_key.clone(),
                    content: trigger.message.clone(),
                    enqueued_at: now_ms,
                    source: "cron".to_string(),
                })
                .await;

            match trigger.refresh(now_ms) {
                Ok(true) => {
                    self.triggers.insert(trigger.id.clone(), trigger);
                },
                Ok(false) => {
                    self.triggers.remove(&trigger.id);
                },
                Err(err) => {
                    tracing::warn!(trigger_id = %trigger.id, %err, "cron trigger schedule became invalid, removing");
                    self.triggers.remove(&trigger.id);
                },
            }
        }
    }
}

#[async_trait]
impl CronService for GatewayCronService {
    async fn list(&self) -> ServiceResult {
        Ok(json!(
            self.triggers
                .iter()
                .map(|entry| trigger_to_json(entry.value()))
                .collect::<Vec<_>>()
        ))
    }

    async fn add(&self, params: Value) -> ServiceResult {
        let session_key = params
            .get("sessionKey")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::message("missing 'sessionKey' parameter"))?
            .to_string();
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::message("missing 'message' parameter"))?
            .to_string();
        let schedule: CronSchedule = params
            .get("schedule")
            .cloned()
            .ok_or_else(|| ServiceError::message("missing 'schedule' parameter"))
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|err| ServiceError::message(format!("invalid schedule: {err}")))
            })?;
        let id = params
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut trigger = CronTrigger::new(id.clone(), session_key, schedule, message);
        trigger
            .refresh(now_ms())
            .map_err(|err| ServiceError::message(format!("invalid schedule: {err}")))?;
        let json = trigger_to_json(&trigger);
        self.triggers.insert(id, trigger);
        Ok(json)
    }

    async fn remove(&self, trigger_id: &str) -> ServiceResult {
        Ok(json!({ "removed": self.triggers.remove(trigger_id).is_some() }))
    }
}

fn trigger_to_json(trigger: &CronTrigger) -> Value {
    json!({
        "id": trigger.id,
        "sessionKey": trigger.session_key,
        "schedule": trigger.schedule,
        "message": trigger.message,
        "nextRunAtMs": trigger.next_run_at_ms,
    })
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
