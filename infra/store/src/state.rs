use crate::error::{StoreError, StoreErrorExt};
use crate::store::panic_message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;
use weave_domain::intent::Intent;
use weave_domain::pattern;

/// Dot-separated location of a slice inside the [`StateTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlicePath(Vec<String>);

impl SlicePath {
    /// Parses `a.b.c`.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidPath`] for empty paths, empty segments or
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        if let Some(problem) = pattern::check_key(path, false) {
            return Err(StoreError::InvalidPath { message: problem.into(), context: None });
        }
        Ok(Self(path.split('.').map(str::to_owned).collect()))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns `true` if one path equals or is a prefix of the other.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for SlicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Whole application state: a JSON object tree partitioned into slices.
///
/// Snapshots are handed out as `Arc<StateTree>` and never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTree(Value);

impl Default for StateTree {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl StateTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored at `path`, if any.
    #[must_use]
    pub fn get(&self, path: &SlicePath) -> Option<&Value> {
        path.segments().try_fold(&self.0, |node, segment| node.get(segment))
    }

    /// Value at a dotted path. Malformed paths simply resolve to `None`.
    #[must_use]
    pub fn slice(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.0, |node, segment| node.get(segment))
    }

    /// Deserializes the value at a dotted path into `T`.
    #[must_use]
    pub fn select<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.slice(path).and_then(|value| T::deserialize(value).ok())
    }

    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Writes `value` at `path`, creating intermediate objects.
    pub(crate) fn set(&mut self, path: &SlicePath, value: Value) {
        let mut node = &mut self.0;
        for segment in path.segments() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else { return };
            node = map.entry(segment.to_owned()).or_insert(Value::Null);
        }
        *node = value;
    }
}

type ReduceFn = Arc<dyn Fn(&Value, &Intent) -> Value + Send + Sync>;

/// A pure function owning one slice of the state tree.
///
/// Reducers must return the current value unchanged for intents they do not
/// handle.
#[derive(Clone)]
pub struct SliceReducer {
    path: SlicePath,
    initial: Value,
    reduce: ReduceFn,
}

impl SliceReducer {
    /// Reducer over raw JSON.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidPath`] if `path` is malformed.
    pub fn new<F>(path: &str, initial: Value, reduce: F) -> Result<Self, StoreError>
    where
        F: Fn(&Value, &Intent) -> Value + Send + Sync + 'static,
    {
        Ok(Self { path: SlicePath::parse(path)?, initial, reduce: Arc::new(reduce) })
    }

    /// Reducer over a typed slice stored as JSON.
    ///
    /// If the stored value cannot be read back as `S` (or the new value cannot be
    /// written), the slice keeps its current value and a warning is logged.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidPath`] for a malformed path and
    /// [`StoreError::Serialization`] if `initial` cannot be serialized.
    ///
    /// # Examples
    /// ```rust
    /// use weave_store::SliceReducer;
    ///
    /// # fn main() -> Result<(), weave_store::StoreError> {
    /// let counter = SliceReducer::typed("counter", 0_u32, |n, intent| match intent.kind() {
    ///     "counter.increment" => n + 1,
    ///     _ => n,
    /// })?;
    /// assert_eq!(counter.path().to_string(), "counter");
    /// # Ok(())
    /// # }
    /// ```
    pub fn typed<S, F>(path: &str, initial: S, reduce: F) -> Result<Self, StoreError>
    where
        S: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(S, &Intent) -> S + Send + Sync + 'static,
    {
        let path = SlicePath::parse(path)?;
        let initial = serde_json::to_value(initial)
            .context(format!("Initial value of slice '{path}'"))?;
        let label = path.to_string();

        let reduce = move |current: &Value, intent: &Intent| {
            let state = match S::deserialize(current) {
                Ok(state) => state,
                Err(e) => {
                    warn!(slice = %label, intent = intent.kind(), error = %e, "Slice holds an unreadable value");
                    return current.clone();
                },
            };
            match serde_json::to_value(reduce(state, intent)) {
                Ok(next) => next,
                Err(e) => {
                    warn!(slice = %label, intent = intent.kind(), error = %e, "Reduced slice cannot be serialized");
                    current.clone()
                },
            }
        };

        Ok(Self { path, initial, reduce: Arc::new(reduce) })
    }

    #[must_use]
    pub const fn path(&self) -> &SlicePath {
        &self.path
    }

    #[must_use]
    pub const fn initial(&self) -> &Value {
        &self.initial
    }

    #[must_use]
    pub fn reduce(&self, current: &Value, intent: &Intent) -> Value {
        (self.reduce)(current, intent)
    }
}

impl fmt::Debug for SliceReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceReducer")
            .field("path", &self.path)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

/// Root reducer: every slice reducer applied to its own part of the tree.
#[derive(Debug, Clone, Default)]
pub struct CombinedReducer {
    slices: Vec<SliceReducer>,
}

impl CombinedReducer {
    /// # Errors
    /// Returns [`StoreError::SliceOverlap`] if two slices share a path or one
    /// path is a prefix of another.
    pub fn new(slices: Vec<SliceReducer>) -> Result<Self, StoreError> {
        for (i, a) in slices.iter().enumerate() {
            if let Some(b) = slices[i + 1..].iter().find(|b| a.path.overlaps(&b.path)) {
                return Err(StoreError::SliceOverlap {
                    first: a.path.to_string().into(),
                    second: b.path.to_string().into(),
                    context: None,
                });
            }
        }
        Ok(Self { slices })
    }

    pub fn paths(&self) -> impl Iterator<Item = &SlicePath> {
        self.slices.iter().map(SliceReducer::path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Tree holding every slice's initial value.
    #[must_use]
    pub fn initial_state(&self) -> StateTree {
        let mut tree = StateTree::new();
        for slice in &self.slices {
            tree.set(&slice.path, slice.initial.clone());
        }
        tree
    }

    /// Applies `intent` to every slice. Slices that return an equal value are
    /// left untouched; a slice missing from `state` starts from its initial value.
    #[must_use]
    pub fn reduce(&self, state: &StateTree, intent: &Intent) -> StateTree {
        self.reduce_isolated(state, intent).0
    }

    /// Like [`CombinedReducer::reduce`], but a panicking slice keeps its
    /// current value and is returned as [`StoreError::ReducerPanicked`].
    #[must_use]
    pub fn reduce_isolated(&self, state: &StateTree, intent: &Intent) -> (StateTree, Vec<StoreError>) {
        let mut next = state.clone();
        let mut failures = Vec::new();
        for slice in &self.slices {
            let current = state.get(&slice.path).unwrap_or(&slice.initial);
            match panic::catch_unwind(AssertUnwindSafe(|| slice.reduce(current, intent))) {
                Ok(reduced) if reduced != *current => next.set(&slice.path, reduced),
                Ok(_) => {},
                Err(payload) => failures.push(StoreError::ReducerPanicked {
                    slice: slice.path.to_string().into(),
                    intent: intent.kind().to_owned().into(),
                    message: panic_message(&*payload).to_owned().into(),
                    context: None,
                }),
            }
        }
        (next, failures)
    }
}

/// Read-only view of one slice, exported to other features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSelector {
    path: SlicePath,
}

impl SliceSelector {
    #[must_use]
    pub const fn new(path: SlicePath) -> Self {
        Self { path }
    }

    #[must_use]
    pub const fn path(&self) -> &SlicePath {
        &self.path
    }

    #[must_use]
    pub fn select<'a>(&self, state: &'a StateTree) -> Option<&'a Value> {
        state.get(&self.path)
    }

    #[must_use]
    pub fn select_as<T: DeserializeOwned>(&self, state: &StateTree) -> Option<T> {
        self.select(state).and_then(|value| T::deserialize(value).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view_reducer() -> SliceReducer {
        SliceReducer::typed("currentView", "home".to_owned(), |view, intent| {
            match (intent.kind(), intent.field_str("viewName")) {
                ("view.change", Some(name)) => name.to_owned(),
                _ => view,
            }
        })
        .expect("valid slice")
    }

    #[test]
    fn paths_overlap_on_prefix() {
        let a = SlicePath::parse("ui.view").unwrap();
        let b = SlicePath::parse("ui").unwrap();
        let c = SlicePath::parse("ui.theme").unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(SlicePath::parse("ui..view").is_err());
    }

    #[test]
    fn combined_reducer_rejects_overlapping_slices() {
        let a = SliceReducer::new("ui", json!({}), |v, _| v.clone()).unwrap();
        let b = SliceReducer::new("ui.view", json!("home"), |v, _| v.clone()).unwrap();
        let err = CombinedReducer::new(vec![a, b]).expect_err("overlap");
        assert!(matches!(err, StoreError::SliceOverlap { .. }));
    }

    #[test]
    fn reduce_touches_only_matching_slices() {
        let counter = SliceReducer::typed("stats.count", 0_u32, |n, intent| {
            if intent.kind() == "count" { n + 1 } else { n }
        })
        .unwrap();
        let reducer = CombinedReducer::new(vec![view_reducer(), counter]).unwrap();
        let initial = reducer.initial_state();
        assert_eq!(initial.as_value(), &json!({ "currentView": "home", "stats": { "count": 0 } }));

        let next = reducer.reduce(&initial, &Intent::new("view.change", json!({ "viewName": "list" })));
        assert_eq!(next.select::<String>("currentView").as_deref(), Some("list"));
        assert_eq!(next.select::<u32>("stats.count"), Some(0));

        let same = reducer.reduce(&next, &Intent::bare("unrelated"));
        assert_eq!(same, next);
    }

    #[test]
    fn unreadable_slice_keeps_current_value() {
        let reducer = CombinedReducer::new(vec![view_reducer()]).unwrap();
        let mut state = StateTree::new();
        state.set(&SlicePath::parse("currentView").unwrap(), json!(42));

        let next = reducer.reduce(&state, &Intent::new("view.change", json!({ "viewName": "x" })));
        assert_eq!(next.slice("currentView"), Some(&json!(42)));
    }

    #[test]
    fn selector_reads_its_slice() {
        let reducer = CombinedReducer::new(vec![view_reducer()]).unwrap();
        let selector = SliceSelector::new(SlicePath::parse("currentView").unwrap());
        assert_eq!(selector.select_as::<String>(&reducer.initial_state()).as_deref(), Some("home"));
    }
}
