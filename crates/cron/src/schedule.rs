//! Schedule kinds and next-run computation for the cron producer (§2 —
//! cron triggers are one of the three inbound concurrency regimes the
//! Gateway reconciles).

use chrono::{DateTime, Utc};
use cron::Schedule as CronExpr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CronSchedule {
    /// One-shot: fire once at `at_ms` (epoch millis).
    At { at_ms: u64 },
    /// Fixed interval, optionally anchored to a specific instant.
    Every {
        every_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        anchor_ms: Option<u64>,
    },
    /// Standard 5-field cron expression, optionally in a named timezone.
    Cron {
        expr: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("every_ms must be > 0")]
    ZeroInterval,
    #[error("invalid cron expression '{0}': {1}")]
    InvalidExpr(String, String),
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// Compute the next run time (epoch millis), or `None` if the schedule has
/// no future runs (a past one-shot).
pub fn compute_next_run(
    schedule: &CronSchedule,
    now_ms: u64,
) -> Result<Option<u64>, ScheduleError> {
    match schedule {
        CronSchedule::At { at_ms } => Ok((*at_ms > now_ms).then_some(*at_ms)),
        CronSchedule::Every {
            every_ms,
            anchor_ms,
        } => {
            if *every_ms == 0 {
                return Err(ScheduleError::ZeroInterval);
            }
            let anchor = anchor_ms.unwrap_or(now_ms);
            if anchor > now_ms {
                Ok(Some(anchor))
            } else {
                let elapsed = now_ms - anchor;
                let intervals = elapsed / every_ms;
                Ok(Some(anchor + (intervals + 1) * every_ms))
            }
        },
        CronSchedule::Cron { expr, tz } => compute_cron_next(expr, tz.as_deref(), now_ms),
    }
}

fn compute_cron_next(
    expr: &str,
    tz: Option<&str>,
    now_ms: u64,
) -> Result<Option<u64>, ScheduleError> {
    let schedule: CronExpr = expr.parse().or_else(|_| {
        let padded = format!("0 {expr} *");
        padded
            .parse::<CronExpr>()
            .map_err(|e| ScheduleError::InvalidExpr(expr.to_string(), e.to_string()))
    })?;

    let now_dt = DateTime::from_timestamp_millis(now_ms as i64).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let next = if let Some(tz_name) = tz {
        let zone: chrono_tz::Tz = tz_name
            .parse()
            .map_err(|_| ScheduleError::UnknownTimezone(tz_name.to_string()))?;
        schedule
            .after(&now_dt.with_timezone(&zone))
            .next()
            .map(|dt| dt.timestamp_millis() as u64)
    } else {
        schedule
            .after(&now_dt)
            .next()
            .map(|dt| dt.timestamp_millis() as u64)
    };

    Ok(next)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_future_fires() {
        let s = CronSchedule::At { at_ms: 2000 };
        assert_eq!(compute_next_run(&s, 1000).unwrap(), Some(2000));
    }

    #[test]
    fn at_past_never_fires_again() {
        let s = CronSchedule::At { at_ms: 500 };
        assert_eq!(compute_next_run(&s, 1000).unwrap(), None);
    }

    #[test]
    fn every_with_no_anchor_uses_now() {
        let s = CronSchedule::Every {
            every_ms: 60_000,
            anchor_ms: None,
        };
        let next = compute_next_run(&s, 100_000).unwrap().unwrap();
        assert_eq!(next, 160_000);
    }

    #[test]
    fn every_with_past_anchor_skips_elapsed_intervals() {
        let s = CronSchedule::Every {
            every_ms: 60_000,
            anchor_ms: Some(10_000),
        };
        let next = compute_next_run(&s, 130_000).unwrap().unwrap();
        assert_eq!(next, 190_000);
    }

    #[test]
    fn every_with_future_anchor_fires_at_anchor() {
        let s = CronSchedule::Every {
            every_ms: 60_000,
            anchor_ms: Some(200_000),
        };
        assert_eq!(compute_next_run(&s, 100_000).unwrap(), Some(200_000));
    }

    #[test]
    fn every_zero_interval_errors() {
        let s = CronSchedule::Every {
            every_ms: 0,
            anchor_ms: None,
        };
        assert!(compute_next_run(&s, 1000).is_err());
    }

    #[test]
    fn cron_five_field_parses() {
        let s = CronSchedule::Cron {
            expr: "0 9 * * *".into(),
            tz: None,
        };
        let now_ms = 1_706_745_600_000;
        let next = compute_next_run(&s, now_ms).unwrap().unwrap();
        assert!(next > now_ms);
        let dt = DateTime::from_timestamp_millis(next as i64).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn cron_respects_timezone() {
        let s = CronSchedule::Cron {
            expr: "0 9 * * *".into(),
            tz: Some("Europe/Paris".into()),
        };
        let now_ms = 1_706_745_600_000;
        let next = compute_next_run(&s, now_ms).unwrap().unwrap();
        let dt = DateTime::from_timestamp_millis(next as i64).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "08:00");
    }

    #[test]
    fn cron_invalid_expr_errors() {
        let s = CronSchedule::Cron {
            expr: "not valid".into(),
            tz: None,
        };
        assert!(compute_next_run(&s, 1000).is_err());
    }

    #[test]
    fn cron_invalid_tz_errors() {
        let s = CronSchedule::Cron {
            expr: "0 9 * * *".into(),
            tz: Some("Mars/Olympus".into()),
        };
        assert!(compute_next_run(&s, 1000).is_err());
    }
}
