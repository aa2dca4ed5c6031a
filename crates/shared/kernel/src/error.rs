use crate::config::ConfigError;
use crate::hooks::HookError;
use std::borrow::Cow;

/// Errors that abort a composition run.
///
/// Registration, resolution and assembly errors describe a structurally broken
/// composition and are never retried.
#[weave_derive::weave_error]
pub enum ComposeError {
    /// Two features were registered under the same name.
    #[error("Duplicate feature name{}: '{name}'", format_context(context))]
    DuplicateFeatureName { name: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A feature declaration is malformed (empty name, bad key, bad payload).
    #[error("Invalid feature '{feature}'{}: {message}", format_context(context))]
    InvalidFeature {
        feature: Cow<'static, str>,
        message: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// A single-value key is exported by more than one feature.
    #[error("Duplicate export{}: '{key}' is exported by '{first}' and '{second}'", format_context(context))]
    DuplicateExport {
        key: Cow<'static, str>,
        first: Cow<'static, str>,
        second: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// A required import matched no export.
    #[error("Unresolved required contract{}: feature '{feature}' needs '{key}'", format_context(context))]
    UnresolvedRequiredContract {
        feature: Cow<'static, str>,
        key: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// A resolved value failed the importing feature's validator.
    #[error("Contract validation failed{}: feature '{feature}', key '{key}': {message}", format_context(context))]
    ContractValidation {
        feature: Cow<'static, str>,
        key: Cow<'static, str>,
        message: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// An aspect could not collect, assemble or inject its artifact.
    #[error("Aspect '{aspect}' failed{}: {message}", format_context(context))]
    AspectAssembly {
        aspect: Cow<'static, str>,
        message: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// A lifecycle hook failed with its fatal flag set.
    #[error("Startup hook of '{feature}' failed{}: {source}", format_context(context))]
    StartupHook {
        feature: Cow<'static, str>,
        source: HookError,
        context: Option<Cow<'static, str>>,
    },

    #[error("Configuration error{}: {source}", format_context(context))]
    Config { source: ConfigError, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
