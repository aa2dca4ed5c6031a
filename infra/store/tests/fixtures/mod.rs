#![allow(dead_code)]

use serde_json::json;
use weave_domain::config::DispatchConfig;
use weave_domain::intent::Intent;
use weave_store::{CombinedReducer, SliceReducer};

/// Counts intents of one type.
pub fn counter(path: &str, kind: &'static str) -> SliceReducer {
    SliceReducer::typed(path, 0_u32, move |n, intent| if intent.kind() == kind { n + 1 } else { n })
        .expect("valid counter slice")
}

/// Records every intent type in reduction order.
pub fn journal() -> SliceReducer {
    SliceReducer::typed("journal", Vec::<String>::new(), |mut seen, intent| {
        seen.push(intent.kind().to_owned());
        seen
    })
    .expect("valid journal slice")
}

pub fn current_view() -> SliceReducer {
    SliceReducer::typed("currentView", "home".to_owned(), |view, intent| {
        match (intent.kind(), intent.field_str("viewName")) {
            ("view.change", Some(name)) => name.to_owned(),
            _ => view,
        }
    })
    .expect("valid view slice")
}

pub fn reducer(slices: Vec<SliceReducer>) -> CombinedReducer {
    CombinedReducer::new(slices).expect("non-overlapping slices")
}

pub fn change_view(name: &str) -> Intent {
    Intent::new("view.change", json!({ "viewName": name }))
}

pub fn dispatch_config(max_chain_depth: Option<usize>, detect_cycles: bool) -> DispatchConfig {
    DispatchConfig { max_chain_depth, detect_cycles, ..DispatchConfig::default() }
}
