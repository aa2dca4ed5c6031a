//! Per-feature lifecycle hooks.

use crate::aspects::Artifacts;
use crate::aspects::state;
use crate::lifecycle::{Phase, Status, StatusCallback};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;
use weave_domain::fassets::Fassets;
use weave_store::Store;

/// Failure of a single feature's hook.
///
/// Hook failures are reported per feature; only [`HookError::Failed`] with
/// `fatal` set aborts the composition.
#[weave_derive::weave_error]
pub enum HookError {
    #[error("Hook failed{}: {message}", format_context(context))]
    Failed { message: Cow<'static, str>, fatal: bool, context: Option<Cow<'static, str>> },

    #[error("Hook timed out after {timeout_ms} ms{}", format_context(context))]
    TimedOut { timeout_ms: u64, context: Option<Cow<'static, str>> },

    #[error("Hook panicked{}: {message}", format_context(context))]
    Panicked { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl HookError {
    /// A failure that stops the composition once all hooks have run.
    pub fn fatal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Failed { message: message.into(), fatal: true, context: None }
    }

    /// A failure that is reported while sibling features keep starting.
    pub fn recoverable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Failed { message: message.into(), fatal: false, context: None }
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed { fatal: true, .. })
    }
}

pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send + 'static>>;

/// Runs once the capability map is resolved, before aspects assemble.
pub type OnResolved = Arc<dyn Fn(&Fassets) -> Result<(), HookError> + Send + Sync>;

/// Runs once every aspect is assembled and injected.
pub type OnStart = Arc<dyn Fn(StartContext) -> HookFuture + Send + Sync>;

/// A hook failure recorded during startup.
#[derive(Debug)]
pub struct HookFailure {
    pub feature: String,
    pub phase: Phase,
    pub error: HookError,
}

/// Progress channel from a hook to the host's status callback.
#[derive(Clone)]
pub struct StatusReporter {
    feature: Arc<str>,
    callback: Option<StatusCallback>,
}

impl StatusReporter {
    pub(crate) fn new(feature: &str, callback: Option<StatusCallback>) -> Self {
        Self { feature: feature.into(), callback }
    }

    /// Reports a progress message on behalf of the feature.
    pub fn report(&self, message: &str) {
        info!(feature = %self.feature, "{message}");
        if let Some(callback) = &self.callback {
            callback(&Status {
                phase: Phase::Starting,
                origin: Phase::Starting,
                feature: Some(&self.feature),
                message,
                error: None,
            });
        }
    }
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter")
            .field("feature", &self.feature)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Everything an `on_start` hook receives.
#[derive(Debug, Clone)]
pub struct StartContext {
    feature: Arc<str>,
    fassets: Fassets,
    artifacts: Artifacts,
    status: StatusReporter,
}

impl StartContext {
    pub(crate) fn new(
        feature: &str,
        fassets: Fassets,
        artifacts: Artifacts,
        status: StatusReporter,
    ) -> Self {
        Self { feature: feature.into(), fassets, artifacts, status }
    }

    /// Name of the feature whose hook is running.
    #[must_use]
    pub fn feature(&self) -> &str {
        &self.feature
    }

    #[must_use]
    pub const fn fassets(&self) -> &Fassets {
        &self.fassets
    }

    #[must_use]
    pub const fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// The running store, when the state aspect is part of the composition.
    #[must_use]
    pub fn store(&self) -> Option<Arc<Store>> {
        state::store(&self.artifacts)
    }

    #[must_use]
    pub const fn status(&self) -> &StatusReporter {
        &self.status
    }
}
