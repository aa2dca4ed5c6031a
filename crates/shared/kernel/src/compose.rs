//! Host entry point: turns a set of features and aspects into a running application.

use crate::aspects::{Artifact, Artifacts, Aspect, AspectPipeline, Collected, state};
use crate::contracts::{ContractRegistry, FassetExport};
use crate::error::ComposeError;
use crate::features::{Feature, FeatureRegistry};
use crate::hooks::{HookError, HookFailure, StartContext, StatusReporter};
use crate::lifecycle::{LifecycleOrchestrator, Phase, Status, StatusCallback};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use weave_domain::config::WeaveConfig;
use weave_domain::fassets::Fassets;
use weave_domain::intent::Intent;
use weave_store::{Store, StoreError};

/// Host callback receiving the display root, invoked once after startup.
pub type RenderReady = Box<dyn FnOnce(Option<Artifact>) + Send>;

/// Everything [`compose_application`] needs.
pub struct Composition {
    features: Vec<Feature>,
    aspects: Vec<Arc<dyn Aspect>>,
    config: WeaveConfig,
    on_render_ready: Option<RenderReady>,
    on_status: Option<StatusCallback>,
}

impl Composition {
    #[must_use]
    pub fn builder() -> CompositionBuilder {
        CompositionBuilder::default()
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("features", &self.features.iter().map(Feature::name).collect::<Vec<_>>())
            .field("aspects", &self.aspects)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct CompositionBuilder {
    features: Vec<Feature>,
    aspects: Vec<Arc<dyn Aspect>>,
    config: WeaveConfig,
    on_render_ready: Option<RenderReady>,
    on_status: Option<StatusCallback>,
}

impl CompositionBuilder {
    #[must_use]
    pub fn feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    #[must_use]
    pub fn features<I>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = Feature>,
    {
        self.features.extend(features);
        self
    }

    #[must_use]
    pub fn aspect<A: Aspect + 'static>(mut self, aspect: A) -> Self {
        self.aspects.push(Arc::new(aspect));
        self
    }

    #[must_use]
    pub fn aspects<I>(mut self, aspects: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Aspect>>,
    {
        self.aspects.extend(aspects);
        self
    }

    #[must_use]
    pub fn config(mut self, config: WeaveConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn on_render_ready<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Option<Artifact>) + Send + 'static,
    {
        self.on_render_ready = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_status<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Status<'_>) + Send + Sync + 'static,
    {
        self.on_status = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn build(self) -> Composition {
        Composition {
            features: self.features,
            aspects: self.aspects,
            config: self.config,
            on_render_ready: self.on_render_ready,
            on_status: self.on_status,
        }
    }
}

impl fmt::Debug for CompositionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionBuilder")
            .field("features", &self.features.len())
            .field("aspects", &self.aspects)
            .finish_non_exhaustive()
    }
}

/// State carried through one composition run. Nothing here is global.
#[derive(Debug)]
pub struct CompositionContext {
    features: FeatureRegistry,
    contracts: ContractRegistry,
    aspects: AspectPipeline,
    config: WeaveConfig,
    lifecycle: LifecycleOrchestrator,
}

impl CompositionContext {
    #[must_use]
    pub fn new(config: WeaveConfig, on_status: Option<StatusCallback>) -> Self {
        Self {
            features: FeatureRegistry::with_flags(config.compose.flags.clone()),
            contracts: ContractRegistry::new(),
            aspects: AspectPipeline::default(),
            config,
            lifecycle: LifecycleOrchestrator::new(on_status),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    #[must_use]
    pub const fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    #[must_use]
    pub const fn aspects(&self) -> &AspectPipeline {
        &self.aspects
    }

    /// `Idle → Registering`: loads features and aspects, validates and collects payloads.
    ///
    /// # Errors
    /// Duplicate or invalid features, duplicate aspects, malformed payloads.
    pub fn register(
        &mut self,
        features: Vec<Feature>,
        aspects: Vec<Arc<dyn Aspect>>,
    ) -> Result<Collected, ComposeError> {
        self.lifecycle.advance(Phase::Registering, "registering features")?;
        let outcome = self.register_inner(features, aspects);
        self.guard(outcome)
    }

    fn register_inner(
        &mut self,
        features: Vec<Feature>,
        aspects: Vec<Arc<dyn Aspect>>,
    ) -> Result<Collected, ComposeError> {
        self.aspects = AspectPipeline::new(aspects)?;
        for feature in features {
            self.features.add(feature)?;
        }
        let active = self.features.active_features();
        self.aspects.validate_payloads(&active)?;
        info!(
            registered = self.features.len(),
            active = active.len(),
            aspects = self.aspects.len(),
            "Features registered"
        );
        Ok(self.aspects.collect(&active))
    }

    /// `Registering → Resolving`: registers contracts of active features and
    /// aspect exports, resolves them, then runs `on_resolved` hooks.
    ///
    /// # Errors
    /// Contract errors verbatim, or a fatal `on_resolved` failure.
    pub fn resolve(
        &mut self,
        collected: &Collected,
        failures: &mut Vec<HookFailure>,
    ) -> Result<Fassets, ComposeError> {
        self.lifecycle.advance(Phase::Resolving, "resolving contracts")?;
        let outcome = self.resolve_inner(collected, failures);
        self.guard(outcome)
    }

    fn resolve_inner(
        &mut self,
        collected: &Collected,
        failures: &mut Vec<HookFailure>,
    ) -> Result<Fassets, ComposeError> {
        let active = self.features.active_features();
        // Name order keeps the first reported clash independent of registration order.
        let mut by_name: Vec<&Arc<Feature>> = active.iter().collect();
        by_name.sort_by(|a, b| a.name().cmp(b.name()));
        for feature in by_name {
            self.contracts.register_exports(feature.name(), feature.exports())?;
            self.contracts.register_imports(feature.name(), feature.uses())?;
        }

        let mut by_feature: BTreeMap<String, Vec<FassetExport>> = BTreeMap::new();
        for export in self.aspects.exports(collected)? {
            by_feature
                .entry(export.feature)
                .or_default()
                .push(FassetExport::define(export.key, export.value));
        }
        for (feature, exports) in &by_feature {
            self.contracts.register_exports(feature, exports)?;
        }

        let fassets = self.contracts.resolve()?;

        for feature in &active {
            let Some(hook) = feature.on_resolved() else { continue };
            let result = panic::catch_unwind(AssertUnwindSafe(|| hook(&fassets)))
                .unwrap_or_else(|payload| {
                    Err(HookError::Panicked {
                        message: panic_message(&*payload).to_owned().into(),
                        context: None,
                    })
                });
            if let Err(error) = result {
                self.record_hook_failure(feature.name(), error, failures)?;
            }
        }
        Ok(fassets)
    }

    /// `Resolving → Assembling`: assembles every aspect, then injects it.
    ///
    /// # Errors
    /// The first aspect error.
    pub async fn assemble(
        &mut self,
        collected: &Collected,
        fassets: &Fassets,
    ) -> Result<Artifacts, ComposeError> {
        self.lifecycle.advance(Phase::Assembling, "assembling aspects")?;
        let outcome = match self.aspects.assemble(collected) {
            Ok(assembled) => self.aspects.inject(&assembled, fassets, &self.config).await,
            Err(e) => Err(e),
        };
        self.guard(outcome)
    }

    /// `Assembling → Starting`: runs every `on_start` hook as its own task,
    /// started in registration order and bounded by the configured timeout.
    ///
    /// # Errors
    /// [`ComposeError::StartupHook`] for the first fatal hook failure, after
    /// all hooks have finished. Aspects are shut down in that case.
    pub async fn start(
        &mut self,
        fassets: &Fassets,
        artifacts: &Artifacts,
        failures: &mut Vec<HookFailure>,
    ) -> Result<(), ComposeError> {
        self.lifecycle.advance(Phase::Starting, "starting features")?;

        let timeout = self.config.compose.hook_timeout();
        let callback = self.lifecycle.status_callback();
        let mut running: Vec<(String, JoinHandle<Result<(), HookError>>)> = Vec::new();

        for feature in self.features.active_features() {
            let Some(hook) = feature.on_start().cloned() else { continue };
            let ctx = StartContext::new(
                feature.name(),
                fassets.clone(),
                artifacts.clone(),
                StatusReporter::new(feature.name(), callback.clone()),
            );
            debug!(feature = feature.name(), "Starting feature");
            let task = tokio::spawn(async move {
                tokio::time::timeout(timeout, hook(ctx)).await.unwrap_or_else(|_| {
                    Err(HookError::TimedOut {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        context: None,
                    })
                })
            });
            running.push((feature.name().to_owned(), task));
        }

        let mut fatal = None;
        for (feature, task) in running {
            let result = match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    let payload = e.into_panic();
                    Err(HookError::Panicked {
                        message: panic_message(&*payload).to_owned().into(),
                        context: None,
                    })
                },
                Err(e) => Err(HookError::Internal { message: e.to_string().into(), context: None }),
            };
            let Err(error) = result else { continue };
            self.lifecycle.report_error(&feature, "startup hook failed", &error);
            warn!(feature = %feature, fatal = error.is_fatal(), error = %error, "Startup hook failed");
            if error.is_fatal() && fatal.is_none() {
                fatal = Some((feature, error));
            } else {
                failures.push(HookFailure { feature, phase: Phase::Starting, error });
            }
        }

        if let Some((feature, source)) = fatal {
            self.aspects.shutdown(artifacts).await;
            let error = ComposeError::StartupHook {
                feature: feature.clone().into(),
                source,
                context: Some("on_start".into()),
            };
            return Err(self.lifecycle.fail(Some(&feature), error));
        }
        Ok(())
    }

    fn record_hook_failure(
        &mut self,
        feature: &str,
        error: HookError,
        failures: &mut Vec<HookFailure>,
    ) -> Result<(), ComposeError> {
        self.lifecycle.report_error(feature, "resolution hook failed", &error);
        warn!(feature, fatal = error.is_fatal(), error = %error, "Resolution hook failed");
        if error.is_fatal() {
            return Err(ComposeError::StartupHook {
                feature: feature.to_owned().into(),
                source: error,
                context: Some("on_resolved".into()),
            });
        }
        failures.push(HookFailure { feature: feature.to_owned(), phase: Phase::Resolving, error });
        Ok(())
    }

    fn guard<T>(&mut self, outcome: Result<T, ComposeError>) -> Result<T, ComposeError> {
        outcome.map_err(|error| {
            let feature = failing_feature(&error).map(str::to_owned);
            self.lifecycle.fail(feature.as_deref(), error)
        })
    }
}

/// A composed, running application.
#[derive(Debug)]
pub struct Application {
    fassets: Fassets,
    artifacts: Artifacts,
    aspects: AspectPipeline,
    lifecycle: LifecycleOrchestrator,
    hook_failures: Vec<HookFailure>,
}

impl Application {
    /// The resolved capability map.
    #[must_use]
    pub const fn fassets(&self) -> &Fassets {
        &self.fassets
    }

    #[must_use]
    pub const fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Recovered hook failures, in the order they were observed.
    #[must_use]
    pub fn hook_failures(&self) -> &[HookFailure] {
        &self.hook_failures
    }

    /// The running store, when the state aspect is part of the composition.
    #[must_use]
    pub fn store(&self) -> Option<Arc<Store>> {
        state::store(&self.artifacts)
    }

    /// Fire-and-forget dispatch through the composition's store.
    ///
    /// # Errors
    /// [`StoreError::Closed`] if there is no store or it has stopped.
    pub fn dispatch(&self, intent: Intent) -> Result<(), StoreError> {
        let store = self.store().ok_or_else(|| StoreError::Closed {
            message: "no store in this composition".into(),
            context: None,
        })?;
        store.dispatch(intent)
    }

    /// `Running → ShuttingDown → Stopped`: shuts aspects down in reverse order.
    ///
    /// # Errors
    /// Returns [`ComposeError::Internal`] if the application is not running.
    pub async fn shutdown(mut self) -> Result<(), ComposeError> {
        self.lifecycle.advance(Phase::ShuttingDown, "shutting down")?;
        self.aspects.shutdown(&self.artifacts).await;
        self.lifecycle.advance(Phase::Stopped, "stopped")
    }
}

/// Composes and starts an application.
///
/// Runs registration, contract resolution, aspect assembly and feature startup
/// in order, reporting progress through `on_status`. On success
/// `on_render_ready` is called exactly once with the root produced by the
/// aspects' `wrap_root`.
///
/// # Errors
/// Registration, resolution and assembly errors verbatim; a fatal startup hook
/// as [`ComposeError::StartupHook`].
///
/// # Examples
/// ```rust
/// use weave_kernel::compose::{Composition, compose_application};
/// use weave_kernel::contracts::{FassetImport, Validator};
/// use weave_kernel::features::Feature;
/// use weave_domain::fassets::FassetValue;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), weave_kernel::error::ComposeError> {
/// let app = compose_application(
///     Composition::builder()
///         .feature(
///             Feature::builder("app")
///                 .uses(FassetImport::required("logger").validate(Validator::operations(["log"])))
///                 .build(),
///         )
///         .feature(
///             Feature::builder("console")
///                 .define("logger", FassetValue::new(()).with_operations(["log"]))
///                 .build(),
///         )
///         .build(),
/// )
/// .await?;
/// assert_eq!(app.fassets().owner("logger"), Some("console"));
/// app.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub async fn compose_application(composition: Composition) -> Result<Application, ComposeError> {
    let Composition { features, aspects, config, on_render_ready, on_status } = composition;
    let mut ctx = CompositionContext::new(config, on_status);
    let mut hook_failures = Vec::new();

    let collected = ctx.register(features, aspects)?;
    let fassets = ctx.resolve(&collected, &mut hook_failures)?;
    let artifacts = ctx.assemble(&collected, &fassets).await?;
    ctx.start(&fassets, &artifacts, &mut hook_failures).await?;

    let root = ctx.aspects.wrap_root(&artifacts);
    if let Some(render) = on_render_ready {
        render(root);
    }

    ctx.lifecycle.advance(Phase::Running, "application running")?;
    let CompositionContext { aspects, lifecycle, .. } = ctx;
    Ok(Application { fassets, artifacts, aspects, lifecycle, hook_failures })
}

fn failing_feature(error: &ComposeError) -> Option<&str> {
    match error {
        ComposeError::DuplicateFeatureName { name, .. } => Some(&**name),
        ComposeError::InvalidFeature { feature, .. }
        | ComposeError::UnresolvedRequiredContract { feature, .. }
        | ComposeError::ContractValidation { feature, .. }
        | ComposeError::StartupHook { feature, .. } => Some(&**feature),
        _ => None,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
