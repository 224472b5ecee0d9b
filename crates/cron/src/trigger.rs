//! `CronTrigger` — a scheduled job that, on firing, injects a system message
//! into a `kind=cron` session (§3 session kinds).

use serde::{Deserialize, Serialize};

use crate::schedule::CronSchedule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronTrigger {
    pub id: String,
    pub session_key: String,
    pub schedule: CronSchedule,
    pub message: String,
    #[serde(default)]
    pub next_run_at_ms: Option<u64>,
}

impl CronTrigger {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        session_key: impl Into<String>,
        schedule: CronSchedule,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            session_key: session_key.into(),
            schedule,
            message: message.into(),
            next_run_at_ms: None,
        }
    }

    /// Recompute `next_run_at_ms` from `now_ms`. Returns `false` once the
    /// schedule has no more future runs.
    pub fn refresh(&mut self, now_ms: u64) -> Result<bool, crate::schedule::ScheduleError> {
        let next = crate::schedule::compute_next_run(&self.schedule, now_ms)?;
        self.next_run_at_ms = next;
        Ok(next.is_some())
    }

    /// Whether this trigger is due to fire at `now_ms`.
    #[must_use]
    pub fn is_due(&self, now_ms: u64) -> bool {
        matches!(self.next_run_at_ms, Some(at) if at <= now_ms)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_sets_next_run() {
        let mut trigger = CronTrigger::new(
            "t1",
            "cron:daily-digest",
            CronSchedule::At { at_ms: 5000 },
            "run digest",
        );
        assert!(trigger.refresh(1000).unwrap());
        assert_eq!(trigger.next_run_at_ms, Some(5000));
    }

    #[test]
    fn is_due_only_once_reached() {
        let mut trigger = CronTrigger::new(
            "t1",
            "cron:daily-digest",
            CronSchedule::At { at_ms: 5000 },
            "run digest",
        );
        trigger.refresh(1000).unwrap();
        assert!(!trigger.is_due(4000));
        assert!(trigger.is_due(5000));
        assert!(trigger.is_due(6000));
    }

    #[test]
    fn refresh_returns_false_when_exhausted() {
        let mut trigger = CronTrigger::new(
            "t1",
            "cron:once",
            CronSchedule::At { at_ms: 500 },
            "run once",
        );
        assert!(!trigger.refresh(1000).unwrap());
        assert!(!trigger.is_due(2000));
    }
}
