use std::borrow::Cow;
use weave_kernel::hooks::HookError;

/// A specialized [`LogIntentsError`] enum of this crate.
#[weave_derive::weave_error]
pub enum LogIntentsError {
    /// The composition has no store whose intents could be logged.
    #[error("Intent log unavailable{}: {message}", format_context(context))]
    StoreUnavailable { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal intent log error{}: {message}", format_context(context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// The feature degrades rather than stopping the composition.
impl From<LogIntentsError> for HookError {
    fn from(error: LogIntentsError) -> Self {
        Self::recoverable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_become_recoverable_hook_failures() {
        let error = LogIntentsError::StoreUnavailable {
            message: "no store".into(),
            context: Some("on_start".into()),
        };
        let hook = HookError::from(error);

        assert!(!hook.is_fatal());
        assert_eq!(hook.to_string(), "Hook failed: Intent log unavailable (on_start): no store");
    }
}
