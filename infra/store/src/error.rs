use std::borrow::Cow;

/// Errors raised by the state tree and the intent dispatcher.
#[weave_derive::weave_error]
pub enum StoreError {
    /// A slice path is malformed.
    #[error("Invalid slice path{}: {message}", format_context(context))]
    InvalidPath { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Two slice reducers claim overlapping parts of the state tree.
    #[error("Overlapping slices{}: '{first}' and '{second}'", format_context(context))]
    SliceOverlap {
        first: Cow<'static, str>,
        second: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// Slice state could not be converted to or from JSON.
    #[error("Slice serialization error{}: {source}", format_context(context))]
    Serialization { source: serde_json::Error, context: Option<Cow<'static, str>> },

    /// An effect rule returned an error or panicked.
    #[error("Effect rule '{rule}' failed on '{intent}'{}: {message}", format_context(context))]
    EffectRule {
        rule: Cow<'static, str>,
        intent: Cow<'static, str>,
        message: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// A slice reducer panicked; the slice kept its previous value.
    #[error("Slice reducer '{slice}' panicked on '{intent}'{}: {message}", format_context(context))]
    ReducerPanicked {
        slice: Cow<'static, str>,
        intent: Cow<'static, str>,
        message: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// An emitted intent exceeded the configured chain depth and was dropped.
    #[error("Intent chain too deep{}: '{intent}' at depth {depth}", format_context(context))]
    ChainDepthExceeded {
        intent: Cow<'static, str>,
        depth: usize,
        context: Option<Cow<'static, str>>,
    },

    /// An emitted intent already appears in its own causal chain and was dropped.
    #[error("Intent cycle detected{}: {chain}", format_context(context))]
    CycleDetected { chain: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The store is not running (no runtime, or already shut down).
    #[error("Store closed{}: {message}", format_context(context))]
    Closed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
