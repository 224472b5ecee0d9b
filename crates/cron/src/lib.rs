//! Cron trigger scheduling — one of the Gateway's three inbound producers
//! alongside channel adapters and CLI clients (§2).

mod schedule;
mod trigger;

pub use schedule::{compute_next_run, CronSchedule, ScheduleError};
pub use trigger::CronTrigger;
