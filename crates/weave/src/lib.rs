//! Facade crate for Weave composition and bundled features.
//! Re-exports domain/kernel/store primitives and aggregates feature declarations.
//! Keep this crate thin: it should compose other crates, not implement business logic.
//!
//! ## Usage
//! - Add `weave` with the desired feature flags (`current-view`, `log-intents`, `full`).
//! - Pass [`standard_aspects`] and [`features::all`] to a
//!   [`Composition`](kernel::compose::Composition).

use std::sync::Arc;
pub use weave_domain as domain;
pub use weave_kernel as kernel;
use weave_kernel::aspects::{Aspect, EffectsAspect, StateAspect};
pub use weave_store as store;

pub use weave_kernel::compose::{Application, Composition, compose_application};
pub use weave_kernel::{ComposeError, ComposeErrorExt};

/// The built-in aspects every host wants: sliced state and async effects.
#[must_use]
pub fn standard_aspects() -> Vec<Arc<dyn Aspect>> {
    vec![Arc::new(StateAspect), Arc::new(EffectsAspect)]
}

/// Bundled features for runtime introspection.
pub mod features {
    use weave_kernel::ComposeError;
    use weave_kernel::features::Feature;

    #[cfg(feature = "current-view")]
    pub use weave_current_view as current_view;
    #[cfg(feature = "log-intents")]
    pub use weave_log_intents as log_intents;

    /// Build-time enabled features (by Cargo feature).
    pub const ENABLED: &[&str] = &[
        #[cfg(feature = "current-view")]
        "current-view",
        #[cfg(feature = "log-intents")]
        "log-intents",
    ];

    #[must_use]
    pub fn is_enabled(name: &str) -> bool {
        ENABLED.contains(&name)
    }

    /// Declares every bundled feature, in [`ENABLED`] order.
    ///
    /// # Errors
    /// Returns [`ComposeError::InvalidFeature`] if a bundled feature cannot be declared.
    pub fn all() -> Result<Vec<Feature>, ComposeError> {
        #[allow(unused_mut)]
        let mut features = Vec::new();

        // Current view
        #[cfg(feature = "current-view")]
        features.push(current_view::feature().map_err(|e| ComposeError::InvalidFeature {
            feature: current_view::NAME.into(),
            message: e.to_string().into(),
            context: None,
        })?);

        // Intent logging
        #[cfg(feature = "log-intents")]
        features.push(log_intents::feature());

        Ok(features)
    }
}
