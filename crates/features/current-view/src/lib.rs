//! Current view feature slice: which view the host displays.
//!
//! Owns the `currentView` slice, reduced by `view.change` intents, and
//! publishes a read-only selector under `currentView.selectors.current` so
//! other features can read the view without touching the slice.

mod error;

pub use crate::error::{CurrentViewError, CurrentViewErrorExt};

use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use weave_kernel::aspects::state::SELECT_OPERATION;
use weave_kernel::contracts::{FassetImport, Validator};
use weave_kernel::domain::capabilities::{LOG_OPERATION, LOGGER_KEY, SharedLogSink};
use weave_kernel::domain::fassets::FassetValue;
use weave_kernel::domain::intent::Intent;
use weave_kernel::features::Feature;
use weave_kernel::store::{EffectError, EffectRule, SliceReducer, SliceSelector, rule};

pub const NAME: &str = "current-view";
pub const SLICE: &str = "currentView";
pub const SELECTOR_KEY: &str = "currentView.selectors.current";
pub const DEFAULT_VIEW: &str = "home";

/// Intent type requesting a view change; payload `{ "viewName": .. }`.
pub const CHANGE: &str = "view.change";
/// Intent type emitted once the slice holds the new view.
pub const CHANGED: &str = "view.changed";

/// Builds a `view.change` intent.
#[must_use]
pub fn change(view: &str) -> Intent {
    Intent::new(CHANGE, json!({ "viewName": view }))
}

/// Declares the feature.
///
/// # Errors
/// Returns [`CurrentViewError::State`] if the slice cannot be declared.
pub fn feature() -> Result<Feature, CurrentViewError> {
    let slice = SliceReducer::typed(SLICE, DEFAULT_VIEW.to_owned(), reduce)
        .context("declaring the currentView slice")?;
    let selector = SliceSelector::new(slice.path().clone());

    Ok(Feature::builder(NAME)
        .uses(
            FassetImport::optional(LOGGER_KEY).validate(
                Validator::operations([LOG_OPERATION]).and(Validator::of_type::<SharedLogSink>()),
            ),
        )
        .define(SELECTOR_KEY, FassetValue::new(selector).with_operations([SELECT_OPERATION]))
        .slice(slice)
        .rules([announce()])
        .on_resolved(|fassets| {
            debug!(logger = fassets.contains(LOGGER_KEY), "Current view resolved");
            Ok(())
        })
        .build())
}

fn reduce(view: String, intent: &Intent) -> String {
    match (intent.kind(), intent.field_str("viewName")) {
        (CHANGE, Some(next)) => next.to_owned(),
        _ => view,
    }
}

fn announce() -> Arc<dyn EffectRule> {
    rule("announce", CHANGE, |ctx, _intent| async move {
        let view = ctx.state().select::<String>(SLICE).ok_or_else(|| EffectError::Rejected {
            message: "currentView slice is missing".into(),
            context: None,
        })?;
        if let Some(logger) = ctx.fassets().get_as::<SharedLogSink>(LOGGER_KEY) {
            logger.log(NAME, &format!("view changed to '{view}'"));
        }
        Ok(vec![Intent::new(CHANGED, json!({ "viewName": view }))])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_kernel::store::StateTree;

    #[test]
    fn change_without_view_name_keeps_current() {
        assert_eq!(reduce("home".to_owned(), &change("list")), "list");
        assert_eq!(reduce("home".to_owned(), &Intent::bare(CHANGE)), "home");
        assert_eq!(reduce("home".to_owned(), &Intent::bare(CHANGED)), "home");
    }

    #[test]
    fn feature_declares_slice_selector_and_rule() {
        let feature = feature().unwrap();
        assert_eq!(feature.name(), NAME);
        assert_eq!(feature.exports()[0].key, SELECTOR_KEY);
        assert!(!feature.uses()[0].is_required());

        let selector = feature.exports()[0].value.downcast::<SliceSelector>().unwrap();
        assert_eq!(selector.select(&StateTree::new()), None);
    }
}
