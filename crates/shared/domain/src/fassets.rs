//! Resolved capabilities ("fassets").
//!
//! A [`FassetValue`] is a type-erased, cheaply clonable value published by a
//! feature together with the set of operations it claims to support. The
//! [`Fassets`] map is the flattened, read-only result of contract resolution; it
//! is built once per run and shared by every feature afterwards.

use crate::pattern;
use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A capability value exported by a feature.
#[derive(Clone)]
pub struct FassetValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    operations: Arc<BTreeSet<Cow<'static, str>>>,
}

impl FassetValue {
    /// Wraps a concrete value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value without re-allocating.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            operations: Arc::new(BTreeSet::new()),
        }
    }

    /// Declares the operations this value supports (its capability set).
    #[must_use]
    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        let set = Arc::make_mut(&mut self.operations);
        set.extend(operations.into_iter().map(Into::into));
        self
    }

    /// Returns `true` if the value declared `operation` in its capability set.
    #[must_use]
    pub fn provides(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| op == operation)
    }

    /// Iterates over the declared operations in sorted order.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(AsRef::as_ref)
    }

    /// Rust type name of the wrapped value, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns a shared handle to the value if it is a `T`.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Identity comparison: both handles point to the same allocation.
    #[must_use]
    pub fn same_value(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.value), Arc::as_ptr(&other.value))
    }
}

impl fmt::Debug for FassetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FassetValue")
            .field("type", &self.type_name)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

impl PartialEq for FassetValue {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other) && self.operations == other.operations
    }
}

/// One feature's contribution to an accumulating key.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub owner: String,
    pub order: i32,
    pub value: FassetValue,
}

/// A resolved entry of the capability map.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Exported exactly once through `define` / `defineUse`.
    Single { owner: String, value: FassetValue },
    /// Accumulated contributions, sorted by `(order, owner)`.
    Many(Vec<Contribution>),
}

#[derive(Debug, Default, PartialEq)]
struct FassetsInner {
    entries: BTreeMap<String, Resolved>,
    features: BTreeSet<String>,
}

/// The resolved, read-only capability map.
///
/// Cloning is cheap (`Arc`); there is no way to mutate a built map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fassets {
    inner: Arc<FassetsInner>,
}

impl Fassets {
    #[must_use]
    pub fn builder() -> FassetsBuilder {
        FassetsBuilder::default()
    }

    /// Single value exported under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FassetValue> {
        match self.inner.entries.get(key)? {
            Resolved::Single { value, .. } => Some(value),
            Resolved::Many(_) => None,
        }
    }

    /// Single value exported under `key`, downcast to `T`.
    #[must_use]
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(FassetValue::downcast::<T>)
    }

    /// Every value reachable from `key`.
    ///
    /// * exact single key: a one-element list;
    /// * accumulating key: its contributions in `(order, owner)` order;
    /// * wildcard pattern: all matching keys in lexicographic order, accumulating
    ///   keys flattened in place.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<FassetValue> {
        if pattern::is_wildcard(key) {
            return self
                .inner
                .entries
                .iter()
                .filter(|(k, _)| pattern::matches(key, k))
                .flat_map(|(_, resolved)| values_of(resolved))
                .collect();
        }
        self.inner.entries.get(key).map(values_of).unwrap_or_default()
    }

    /// Raw resolved entry, including ownership information.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&Resolved> {
        self.inner.entries.get(key)
    }

    /// Feature that exported the single value under `key`.
    #[must_use]
    pub fn owner(&self, key: &str) -> Option<&str> {
        match self.inner.entries.get(key)? {
            Resolved::Single { owner, .. } => Some(owner),
            Resolved::Many(_) => None,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Exported keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.entries.keys().map(String::as_str)
    }

    /// Returns `true` if a feature with this name is active in the composition.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.inner.features.contains(name)
    }

    /// Active feature names in lexicographic order.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.inner.features.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

fn values_of(resolved: &Resolved) -> Vec<FassetValue> {
    match resolved {
        Resolved::Single { value, .. } => vec![value.clone()],
        Resolved::Many(items) => items.iter().map(|c| c.value.clone()).collect(),
    }
}

/// Accumulates entries for a [`Fassets`] map.
///
/// Uniqueness is the caller's responsibility; inserting a single key twice keeps
/// the last value.
#[derive(Debug, Default)]
pub struct FassetsBuilder {
    entries: BTreeMap<String, Resolved>,
    features: BTreeSet<String>,
}

impl FassetsBuilder {
    pub fn single(
        &mut self,
        key: impl Into<String>,
        owner: impl Into<String>,
        value: FassetValue,
    ) -> &mut Self {
        self.entries.insert(key.into(), Resolved::Single { owner: owner.into(), value });
        self
    }

    pub fn contribute(
        &mut self,
        key: impl Into<String>,
        owner: impl Into<String>,
        order: i32,
        value: FassetValue,
    ) -> &mut Self {
        let entry = self.entries.entry(key.into()).or_insert_with(|| Resolved::Many(Vec::new()));
        if let Resolved::Many(items) = entry {
            items.push(Contribution { owner: owner.into(), order, value });
        }
        self
    }

    pub fn feature(&mut self, name: impl Into<String>) -> &mut Self {
        self.features.insert(name.into());
        self
    }

    #[must_use]
    pub fn build(mut self) -> Fassets {
        for resolved in self.entries.values_mut() {
            if let Resolved::Many(items) = resolved {
                items.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.owner.cmp(&b.owner)));
            }
        }
        Fassets { inner: Arc::new(FassetsInner { entries: self.entries, features: self.features }) }
    }
}
