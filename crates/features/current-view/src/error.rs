use std::borrow::Cow;
use weave_kernel::store::StoreError;

/// A specialized [`CurrentViewError`] enum of this crate.
#[weave_derive::weave_error]
pub enum CurrentViewError {
    /// The slice or its selector could not be declared.
    #[error("Current view state error{}: {source}", format_context(context))]
    State { source: StoreError, context: Option<Cow<'static, str>> },
    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal current view error{}: {message}", format_context(context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
