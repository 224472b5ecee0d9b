//! Agent run state machine (§4.10): `idle -> preparing -> running ->
//! finalizing -> {completed|failed}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Idle,
    Preparing,
    Running,
    Finalizing,
    Completed,
    Failed,
}

/// Events that drive phase transitions. Named after the table in the
/// specification rather than after the stream event they produce, since
/// several events (`delta`, `tool`, `compaction`) are self-loops on
/// `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    Ready,
    Delta,
    Tool,
    Compaction,
    Finish,
    Cancel,
    Ok,
    Err,
}

#[derive(Debug, thiserror::Error)]
#[error("illegal transition: {event:?} from phase {from:?}")]
pub struct IllegalTransition {
    pub from: AgentPhase,
    pub event: LifecycleEvent,
}

impl AgentPhase {
    /// Apply `event`, returning the resulting phase or an error if the
    /// transition is not defined for the current phase.
    pub fn apply(self, event: LifecycleEvent) -> Result<AgentPhase, IllegalTransition> {
        use AgentPhase::{Completed, Failed, Finalizing, Idle, Preparing, Running};
        use LifecycleEvent::{Cancel, Compaction, Delta, Err as EvErr, Finish, Ok as EvOk, Ready, Start, Tool};

        let next = match (self, event) {
            (Idle, Start) => Preparing,
            (Preparing, Ready) => Running,
            (Running, Delta | Tool | Compaction) => Running,
            (Running, Finish) => Finalizing,
            (Running, Cancel) => Finalizing,
            (Finalizing, EvOk) => Completed,
            (Finalizing, EvErr) => Failed,
            _ => return Err(IllegalTransition { from: self, event }),
        };
        Ok(next)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentPhase::Completed | AgentPhase::Failed)
    }

    #[must_use]
    pub fn is_cancellable(self) -> bool {
        matches!(self, AgentPhase::Preparing | AgentPhase::Running)
    }
}

/// Tracks the phase of a single agent run plus whether it was cancelled
/// (`cancel` transitions to `finalizing` the same as `finish`, but the run
/// must still be reported as failed per the specification table).
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub phase: AgentPhase,
    pub cancelled: bool,
}

impl Default for AgentRun {
    fn default() -> Self {
        Self {
            phase: AgentPhase::Idle,
            cancelled: false,
        }
    }
}

impl AgentRun {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: LifecycleEvent) -> Result<AgentPhase, IllegalTransition> {
        if event == LifecycleEvent::Cancel {
            self.cancelled = true;
        }
        self.phase = self.phase.apply(event)?;
        Ok(self.phase)
    }

    /// The terminal event a finalizing run should be driven with: `err` if
    /// cancelled, otherwise whatever the caller observed.
    #[must_use]
    pub fn terminal_event_for_cancel(&self) -> LifecycleEvent {
        LifecycleEvent::Err
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_completed() {
        let mut run = AgentRun::new();
        run.apply(LifecycleEvent::Start).unwrap();
        run.apply(LifecycleEvent::Ready).unwrap();
        run.apply(LifecycleEvent::Delta).unwrap();
        run.apply(LifecycleEvent::Tool).unwrap();
        run.apply(LifecycleEvent::Finish).unwrap();
        run.apply(LifecycleEvent::Ok).unwrap();
        assert_eq!(run.phase, AgentPhase::Completed);
    }

    #[test]
    fn cancel_during_running_goes_to_finalizing_then_failed() {
        let mut run = AgentRun::new();
        run.apply(LifecycleEvent::Start).unwrap();
        run.apply(LifecycleEvent::Ready).unwrap();
        run.apply(LifecycleEvent::Cancel).unwrap();
        assert_eq!(run.phase, AgentPhase::Finalizing);
        assert!(run.cancelled);
        run.apply(run.terminal_event_for_cancel()).unwrap();
        assert_eq!(run.phase, AgentPhase::Failed);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut run = AgentRun::new();
        assert!(run.apply(LifecycleEvent::Ready).is_err());
        assert_eq!(run.phase, AgentPhase::Idle);
    }

    #[test]
    fn terminal_phases_accept_no_further_events() {
        let mut run = AgentRun::new();
        run.apply(LifecycleEvent::Start).unwrap();
        run.apply(LifecycleEvent::Ready).unwrap();
        run.apply(LifecycleEvent::Finish).unwrap();
        run.apply(LifecycleEvent::Ok).unwrap();
        assert!(run.phase.is_terminal());
        assert!(run.apply(LifecycleEvent::Delta).is_err());
    }

    #[test]
    fn cancellable_only_while_preparing_or_running() {
        assert!(AgentPhase::Preparing.is_cancellable());
        assert!(AgentPhase::Running.is_cancellable());
        assert!(!AgentPhase::Idle.is_cancellable());
        assert!(!AgentPhase::Finalizing.is_cancellable());
    }
}
