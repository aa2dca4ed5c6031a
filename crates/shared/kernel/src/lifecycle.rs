//! Composition lifecycle state machine.

use crate::error::ComposeError;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Phases of a composition run.
///
/// `Idle → Registering → Resolving → Assembling → Starting → Running`, then
/// `ShuttingDown → Stopped`. Any phase before `Running` may move to `Failed`,
/// which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Registering,
    Resolving,
    Assembling,
    Starting,
    Running,
    Failed,
    ShuttingDown,
    Stopped,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Registering => "registering",
            Self::Resolving => "resolving",
            Self::Assembling => "assembling",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Registering)
                | (Self::Registering, Self::Resolving)
                | (Self::Resolving, Self::Assembling)
                | (Self::Assembling, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Running, Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Stopped)
                | (
                    Self::Idle
                        | Self::Registering
                        | Self::Resolving
                        | Self::Assembling
                        | Self::Starting,
                    Self::Failed
                )
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress or failure report for the host.
#[derive(Debug, Clone, Copy)]
pub struct Status<'a> {
    /// Phase the orchestrator is in.
    pub phase: Phase,
    /// Phase that produced the report; differs from `phase` only for failures.
    pub origin: Phase,
    pub feature: Option<&'a str>,
    pub message: &'a str,
    pub error: Option<&'a (dyn Error + Send + Sync + 'static)>,
}

/// Host callback receiving every [`Status`].
pub type StatusCallback = Arc<dyn Fn(&Status<'_>) + Send + Sync>;

/// Drives the phase transitions of one run and reports them to the host.
pub struct LifecycleOrchestrator {
    phase: Phase,
    on_status: Option<StatusCallback>,
}

impl LifecycleOrchestrator {
    #[must_use]
    pub fn new(on_status: Option<StatusCallback>) -> Self {
        Self { phase: Phase::Idle, on_status }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn status_callback(&self) -> Option<StatusCallback> {
        self.on_status.clone()
    }

    /// Moves to `next` and reports `message`.
    ///
    /// # Errors
    /// Returns [`ComposeError::Internal`] for a transition the state machine does not allow.
    pub fn advance(&mut self, next: Phase, message: &str) -> Result<(), ComposeError> {
        if !self.phase.can_transition_to(next) {
            return Err(ComposeError::Internal {
                message: format!("invalid lifecycle transition {} -> {next}", self.phase).into(),
                context: None,
            });
        }
        debug!(from = %self.phase, to = %next, "Lifecycle transition");
        self.phase = next;
        self.report(None, message);
        Ok(())
    }

    /// Reports progress within the current phase.
    pub fn report(&self, feature: Option<&str>, message: &str) {
        self.emit(&Status { phase: self.phase, origin: self.phase, feature, message, error: None });
    }

    /// Reports a recovered per-feature failure without leaving the current phase.
    pub fn report_error(
        &self,
        feature: &str,
        message: &str,
        error: &(dyn Error + Send + Sync + 'static),
    ) {
        self.emit(&Status {
            phase: self.phase,
            origin: self.phase,
            feature: Some(feature),
            message,
            error: Some(error),
        });
    }

    /// Moves to `Failed`, reports the error and hands it back unchanged.
    pub fn fail(&mut self, feature: Option<&str>, error: ComposeError) -> ComposeError {
        let origin = self.phase;
        self.phase = Phase::Failed;
        error!(phase = %origin, feature = feature.unwrap_or("-"), error = %error, "Composition failed");

        let message = format!("composition failed while {origin}");
        self.emit(&Status {
            phase: Phase::Failed,
            origin,
            feature,
            message: &message,
            error: Some(&error),
        });
        error
    }

    fn emit(&self, status: &Status<'_>) {
        if status.error.is_none() {
            info!(phase = %status.phase, feature = status.feature.unwrap_or("-"), "{}", status.message);
        }
        if let Some(callback) = &self.on_status {
            callback(status);
        }
    }
}

impl fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("phase", &self.phase)
            .field("on_status", &self.on_status.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn happy_path_transitions_are_allowed() {
        let mut lifecycle = LifecycleOrchestrator::new(None);
        for next in [
            Phase::Registering,
            Phase::Resolving,
            Phase::Assembling,
            Phase::Starting,
            Phase::Running,
            Phase::ShuttingDown,
            Phase::Stopped,
        ] {
            lifecycle.advance(next, "next").unwrap();
        }
        assert!(lifecycle.phase().is_terminal());
    }

    #[test]
    fn skipping_phases_is_rejected() {
        let mut lifecycle = LifecycleOrchestrator::new(None);
        let err = lifecycle.advance(Phase::Running, "too early").expect_err("invalid");
        assert!(matches!(err, ComposeError::Internal { .. }));
        assert!(!Phase::Running.can_transition_to(Phase::Failed));
        assert!(!Phase::Failed.can_transition_to(Phase::Registering));
    }

    #[test]
    fn failure_is_reported_with_origin() {
        let seen: Arc<Mutex<Vec<(Phase, Phase, Option<String>, bool)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let mut lifecycle = LifecycleOrchestrator::new(Some(Arc::new(move |status: &Status<'_>| {
            sink.lock().push((
                status.phase,
                status.origin,
                status.feature.map(str::to_owned),
                status.error.is_some(),
            ));
        })));

        lifecycle.advance(Phase::Registering, "registering").unwrap();
        lifecycle.advance(Phase::Resolving, "resolving").unwrap();
        let error = lifecycle.fail(Some("app"), ComposeError::from("boom"));
        assert!(matches!(error, ComposeError::Internal { .. }));
        assert_eq!(lifecycle.phase(), Phase::Failed);

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], (Phase::Failed, Phase::Resolving, Some("app".to_owned()), true));
    }
}
