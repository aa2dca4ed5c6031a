#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the Weave workspace.
//!
//! * [`macro@weave_error`] turns an enum into a `thiserror` error with context support.
//! * [`macro@main`] bootstraps an `async fn main` on a preconfigured Tokio runtime.
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! weave-derive = { path = "../infra/derive" }
//! ```
//!
//! Examples below are `ignore`d to avoid compiling in this crate; the `tests/ui`
//! directory holds compiled samples.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemFn, parse_macro_input};

/// Attribute macro to bootstrap the specialized Tokio runtime.
///
/// This macro transforms an `async fn main` into a standard `fn main` that initializes
/// a pre-configured Tokio runtime based on the specified profile.
///
/// # Arguments
///
/// * `cooperative` - Single-threaded scheduler; every task shares the main thread.
/// * `high_performance` - Multi-threaded, tuned for throughput.
/// * `memory_efficient` - Multi-threaded with half the workers and smaller stacks.
/// * `default` - Multi-threaded with worker threads auto-detected.
///
/// # Examples
///
/// ```rust,ignore
/// #[weave_runtime::main(cooperative)]
/// async fn main() -> anyhow::Result<()> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    macros::runtime::expand_main(args.into(), input).into()
}

/// Attribute macro for defining crate-level error enums.
///
/// # Features
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]`.
/// * **Context Support**: Generates a companion `...Ext` trait that adds `.context()`
///   to any `Result` that can be converted into this error type.
/// * **Context Accessor**: Generates `context_message()` returning the attached context.
/// * **Standard Conversions**: Implements `From<T>` for variants containing a `#[source]` field,
///   enabling the use of the `?` operator for upstream errors.
/// * **Internal Fallback**: Provides `From<&'static str>` and `From<String>` if an
///   `Internal` variant is present.
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum**.
/// 2. Variants that support context must include a `context: Option<Cow<'static, str>>` field.
/// 3. Variants wrapping external errors must include a `source: T` field or a field marked
///    with `#[source]`/`#[from]` (compatible with `thiserror`).
/// 4. Tuple or unit variants are rejected.
/// 5. One error enum per module: a private `format_context` helper is emitted alongside it.
///
/// # Example
///
/// ```rust,ignore
/// use std::borrow::Cow;
///
/// #[weave_derive::weave_error]
/// pub enum ConfigError {
///     #[error("Config error{}: {source}", format_context(.context))]
///     Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
///
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn load() -> Result<Settings, ConfigError> {
///     builder.build().context("Loading weave.toml")?.try_deserialize().map_err(Into::into)
/// }
/// ```
#[proc_macro_attribute]
pub fn weave_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}
