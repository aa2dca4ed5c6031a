#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use weave_kernel::aspects::{EffectsAspect, StateAspect};
use weave_kernel::compose::CompositionBuilder;
use weave_kernel::contracts::{FassetImport, Validator};
use weave_kernel::domain::fassets::FassetValue;
use weave_kernel::domain::intent::Intent;
use weave_kernel::features::Feature;
use weave_kernel::lifecycle::{Phase, Status};
use weave_kernel::store::SliceReducer;

#[derive(Debug, PartialEq, Eq)]
pub struct ConsoleLogger;

/// Requires a `logger` providing `log`.
pub fn app() -> Feature {
    Feature::builder("app")
        .uses(FassetImport::required("logger").validate(Validator::operations(["log"])))
        .build()
}

/// Defines `logger`.
pub fn console() -> Feature {
    Feature::builder("console")
        .define("logger", FassetValue::new(ConsoleLogger).with_operations(["log"]))
        .build()
}

pub fn theme(name: &str, color: &'static str) -> Feature {
    Feature::builder(name).define("theme", FassetValue::new(color)).build()
}

/// Slice `currentView` driven by `view.change`.
pub fn current_view() -> Feature {
    Feature::builder("current-view")
        .slice(
            SliceReducer::typed("currentView", "home".to_owned(), |view, intent: &Intent| {
                match (intent.kind(), intent.field_str("viewName")) {
                    ("view.change", Some(next)) => next.to_owned(),
                    _ => view,
                }
            })
            .unwrap(),
        )
        .build()
}

pub fn change_view(name: &str) -> Intent {
    Intent::new("view.change", json!({ "viewName": name }))
}

/// Composition builder with both built-in aspects.
pub fn with_aspects(builder: CompositionBuilder) -> CompositionBuilder {
    builder.aspect(StateAspect).aspect(EffectsAspect)
}

/// Records `(phase, origin, feature, has_error)` for every status.
#[derive(Clone, Default)]
pub struct StatusLog(Arc<Mutex<Vec<(Phase, Phase, Option<String>, bool)>>>);

impl StatusLog {
    pub fn install(&self, builder: CompositionBuilder) -> CompositionBuilder {
        let sink = Arc::clone(&self.0);
        builder.on_status(move |status: &Status<'_>| {
            sink.lock().push((
                status.phase,
                status.origin,
                status.feature.map(str::to_owned),
                status.error.is_some(),
            ));
        })
    }

    /// Distinct phases in the order they were first reported.
    pub fn phases(&self) -> Vec<Phase> {
        let mut phases = Vec::new();
        for (phase, ..) in self.0.lock().iter() {
            if phases.last() != Some(phase) {
                phases.push(*phase);
            }
        }
        phases
    }

    pub fn errors(&self) -> Vec<(Phase, Option<String>)> {
        self.0
            .lock()
            .iter()
            .filter(|(.., has_error)| *has_error)
            .map(|(_, origin, feature, _)| (*origin, feature.clone()))
            .collect()
    }
}
