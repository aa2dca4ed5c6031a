//! Feature descriptors and the registry that owns them.

use crate::aspects::{effects, state};
use crate::contracts::{FassetExport, FassetImport};
use crate::error::ComposeError;
use crate::hooks::{HookError, HookFuture, OnResolved, OnStart, StartContext};
use fxhash::FxHashMap;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use weave_domain::fassets::{FassetValue, Fassets};
use weave_store::{EffectRule, SliceReducer};

/// Type-erased payload a feature hands to one aspect.
pub type AspectPayload = Arc<dyn Any + Send + Sync>;

/// An independently declared unit of functionality.
///
/// Built once through [`Feature::builder`] and immutable afterwards.
#[derive(Clone)]
pub struct Feature {
    name: String,
    enabled: bool,
    uses: Vec<FassetImport>,
    exports: Vec<FassetExport>,
    payloads: BTreeMap<String, AspectPayload>,
    on_resolved: Option<OnResolved>,
    on_start: Option<OnStart>,
}

impl Feature {
    /// # Examples
    /// ```rust
    /// use weave_kernel::features::Feature;
    /// use weave_kernel::contracts::{FassetImport, Validator};
    /// use weave_domain::fassets::FassetValue;
    ///
    /// let console = Feature::builder("console")
    ///     .define("logger", FassetValue::new(()).with_operations(["log"]))
    ///     .build();
    /// let app = Feature::builder("app")
    ///     .uses(FassetImport::required("logger").validate(Validator::operations(["log"])))
    ///     .build();
    /// assert_eq!(console.exports().len(), 1);
    /// assert!(app.is_enabled());
    /// ```
    pub fn builder(name: impl Into<String>) -> FeatureBuilder {
        FeatureBuilder {
            feature: Self {
                name: name.into(),
                enabled: true,
                uses: Vec::new(),
                exports: Vec::new(),
                payloads: BTreeMap::new(),
                on_resolved: None,
                on_start: None,
            },
            slices: Vec::new(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared enablement, before external flags are applied.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn uses(&self) -> &[FassetImport] {
        &self.uses
    }

    #[must_use]
    pub fn exports(&self) -> &[FassetExport] {
        &self.exports
    }

    /// Payload for the aspect named `aspect`.
    #[must_use]
    pub fn payload(&self, aspect: &str) -> Option<&AspectPayload> {
        self.payloads.get(aspect)
    }

    /// Aspect names this feature carries payloads for.
    pub fn payload_aspects(&self) -> impl Iterator<Item = &str> {
        self.payloads.keys().map(String::as_str)
    }

    #[must_use]
    pub fn on_resolved(&self) -> Option<&OnResolved> {
        self.on_resolved.as_ref()
    }

    #[must_use]
    pub fn on_start(&self) -> Option<&OnStart> {
        self.on_start.as_ref()
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("uses", &self.uses)
            .field("exports", &self.exports)
            .field("payloads", &self.payloads.keys().collect::<Vec<_>>())
            .field("on_resolved", &self.on_resolved.is_some())
            .field("on_start", &self.on_start.is_some())
            .finish()
    }
}

/// Declarative builder for [`Feature`].
pub struct FeatureBuilder {
    feature: Feature,
    slices: Vec<SliceReducer>,
    rules: Vec<Arc<dyn EffectRule>>,
}

impl FeatureBuilder {
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.feature.enabled = enabled;
        self
    }

    #[must_use]
    pub fn uses(mut self, import: FassetImport) -> Self {
        self.feature.uses.push(import);
        self
    }

    #[must_use]
    pub fn define(mut self, key: impl Into<String>, value: FassetValue) -> Self {
        self.feature.exports.push(FassetExport::define(key, value));
        self
    }

    /// Exports a value that another feature must import.
    #[must_use]
    pub fn define_use(mut self, key: impl Into<String>, value: FassetValue) -> Self {
        self.feature.exports.push(FassetExport::define_use(key, value));
        self
    }

    /// Adds an entry to an accumulating key.
    #[must_use]
    pub fn contribute(mut self, key: impl Into<String>, order: i32, value: FassetValue) -> Self {
        self.feature.exports.push(FassetExport::contribute(key, order, value));
        self
    }

    /// Attaches a payload for a custom aspect. A later call for the same aspect replaces it.
    #[must_use]
    pub fn payload<T: Any + Send + Sync>(mut self, aspect: impl Into<String>, payload: T) -> Self {
        self.feature.payloads.insert(aspect.into(), Arc::new(payload));
        self
    }

    /// Registers a state slice with the `reducer` aspect.
    #[must_use]
    pub fn slice(mut self, reducer: SliceReducer) -> Self {
        self.slices.push(reducer);
        self
    }

    /// Registers effect rules with the `logic` aspect.
    #[must_use]
    pub fn rules<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn EffectRule>>,
    {
        self.rules.extend(rules);
        self
    }

    #[must_use]
    pub fn on_resolved<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Fassets) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.feature.on_resolved = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(StartContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.feature.on_start = Some(Arc::new(move |ctx| -> HookFuture { Box::pin(hook(ctx)) }));
        self
    }

    #[must_use]
    pub fn build(mut self) -> Feature {
        if !self.slices.is_empty() {
            self.feature.payloads.insert(state::NAME.to_owned(), Arc::new(self.slices));
        }
        if !self.rules.is_empty() {
            self.feature.payloads.insert(effects::NAME.to_owned(), Arc::new(self.rules));
        }
        self.feature
    }
}

impl fmt::Debug for FeatureBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureBuilder")
            .field("feature", &self.feature)
            .field("slices", &self.slices)
            .field("rules", &self.rules)
            .finish()
    }
}

#[derive(Debug)]
struct Registered {
    feature: Arc<Feature>,
    enabled: bool,
}

/// Owns every feature of a composition run and fixes their enablement.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    features: Vec<Registered>,
    index: FxHashMap<String, usize>,
    flags: BTreeMap<String, bool>,
}

impl FeatureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose enablement is overridden by external flags:
    /// `false` disables a feature, `true` force-enables it.
    #[must_use]
    pub fn with_flags(flags: BTreeMap<String, bool>) -> Self {
        Self { flags, ..Self::default() }
    }

    /// # Errors
    /// * [`ComposeError::InvalidFeature`] for an empty name.
    /// * [`ComposeError::DuplicateFeatureName`] if the name is taken, whether
    ///   the other feature is enabled or not.
    pub fn add(&mut self, feature: impl Into<Arc<Feature>>) -> Result<(), ComposeError> {
        let feature = feature.into();
        let name = feature.name();

        if name.trim().is_empty() {
            return Err(ComposeError::InvalidFeature {
                feature: name.to_owned().into(),
                message: "feature name cannot be empty".into(),
                context: None,
            });
        }
        if self.index.contains_key(name) {
            return Err(ComposeError::DuplicateFeatureName {
                name: name.to_owned().into(),
                context: None,
            });
        }

        let enabled = match self.flags.get(name) {
            Some(&flag) => {
                if flag != feature.is_enabled() {
                    debug!(feature = name, enabled = flag, "Feature enablement overridden by flag");
                }
                flag
            },
            None => feature.is_enabled(),
        };

        debug!(feature = name, enabled, "Feature registered");
        self.index.insert(name.to_owned(), self.features.len());
        self.features.push(Registered { feature, enabled });
        Ok(())
    }

    /// Enabled features in registration order.
    #[must_use]
    pub fn active_features(&self) -> Vec<Arc<Feature>> {
        self.features.iter().filter(|r| r.enabled).map(|r| Arc::clone(&r.feature)).collect()
    }

    /// Effective enablement of a registered feature.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.index.get(name).and_then(|&i| self.features.get(i)).map(|r| r.enabled)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_fail_even_when_disabled() {
        let mut registry = FeatureRegistry::new();
        registry.add(Feature::builder("theme").enabled(false).build()).unwrap();
        let err = registry.add(Feature::builder("theme").build()).expect_err("duplicate");
        assert!(matches!(err, ComposeError::DuplicateFeatureName { ref name, .. } if name == "theme"));
    }

    #[test]
    fn empty_name_is_invalid() {
        let err = FeatureRegistry::new().add(Feature::builder(" ").build()).expect_err("empty");
        assert!(matches!(err, ComposeError::InvalidFeature { .. }));
    }

    #[test]
    fn flags_override_declared_enablement_and_order_is_kept() {
        let flags = BTreeMap::from([("b".to_owned(), false), ("c".to_owned(), true)]);
        let mut registry = FeatureRegistry::with_flags(flags);
        registry.add(Feature::builder("a").build()).unwrap();
        registry.add(Feature::builder("b").build()).unwrap();
        registry.add(Feature::builder("c").enabled(false).build()).unwrap();

        let active: Vec<String> =
            registry.active_features().iter().map(|f| f.name().to_owned()).collect();
        assert_eq!(active, vec!["a", "c"]);
        assert_eq!(registry.is_enabled("b"), Some(false));
        assert_eq!(registry.is_enabled("zzz"), None);
    }

    #[test]
    fn builder_routes_slices_and_rules_to_builtin_aspects() {
        let slice = SliceReducer::typed("count", 0_u32, |n, _| n).unwrap();
        let rule = weave_store::rule("noop", "tick", |_, _| async { Ok(Vec::new()) });
        let feature = Feature::builder("counter").slice(slice).rules([rule]).build();

        let aspects: Vec<&str> = feature.payload_aspects().collect();
        assert_eq!(aspects, vec![effects::NAME, state::NAME]);
        assert!(feature.payload(state::NAME).unwrap().is::<Vec<SliceReducer>>());
    }
}
