//! Extension points that fold per-feature payloads into runtime artifacts.
//!
//! An [`Aspect`] owns one payload kind, identified by its name. The
//! [`AspectPipeline`] drives every aspect through the same steps:
//! `collect` (before resolution), `exports`, `assemble`, `inject` (after
//! resolution), `wrap_root` and finally `shutdown`.

pub mod effects;
mod pipeline;
pub mod state;

pub use effects::EffectsAspect;
pub use pipeline::{AspectPipeline, Collected};
pub use state::{Provider, StateAspect};

use crate::error::ComposeError;
use crate::features::{AspectPayload, Feature};
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use weave_domain::config::WeaveConfig;
use weave_domain::fassets::{FassetValue, Fassets};

/// Type-erased result of assembling one aspect.
pub type Artifact = Arc<dyn Any + Send + Sync>;

/// One feature's payload for one aspect.
#[derive(Clone)]
pub struct Contribution {
    pub feature: String,
    pub payload: AspectPayload,
}

impl fmt::Debug for Contribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contribution").field("feature", &self.feature).finish_non_exhaustive()
    }
}

/// A fasset an aspect publishes on behalf of a contributing feature.
#[derive(Debug, Clone)]
pub struct AspectExport {
    pub feature: String,
    pub key: String,
    pub value: FassetValue,
}

/// What [`Aspect::inject`] can see.
#[derive(Debug, Clone, Copy)]
pub struct InjectContext<'a> {
    pub fassets: &'a Fassets,
    /// Every assembled artifact, before injection.
    pub artifacts: &'a Artifacts,
    pub config: &'a WeaveConfig,
}

/// An extension point aggregating one kind of payload.
///
/// Only [`Aspect::name`] and [`Aspect::assemble`] are mandatory.
#[async_trait]
pub trait Aspect: Send + Sync + fmt::Debug {
    /// Payload key in feature descriptors; unique within a composition.
    fn name(&self) -> &str;

    /// Registration-time payload check. Returns a description of the problem.
    fn validate_payload(&self, _feature: &str, _payload: &AspectPayload) -> Result<(), String> {
        Ok(())
    }

    /// Extracts the payloads addressed to this aspect, in feature order.
    /// A feature without a payload contributes nothing.
    fn collect(&self, features: &[Arc<Feature>]) -> Vec<Contribution> {
        features
            .iter()
            .filter_map(|feature| {
                feature.payload(self.name()).map(|payload| Contribution {
                    feature: feature.name().to_owned(),
                    payload: Arc::clone(payload),
                })
            })
            .collect()
    }

    /// Fassets to register before contract resolution.
    ///
    /// # Errors
    /// Returns [`ComposeError::AspectAssembly`] if a payload cannot be read.
    fn exports(&self, _contributions: &[Contribution]) -> Result<Vec<AspectExport>, ComposeError> {
        Ok(Vec::new())
    }

    /// Folds contributions, in order, into one artifact. Must be deterministic.
    ///
    /// # Errors
    /// Returns [`ComposeError::AspectAssembly`] when the contributions cannot be combined.
    fn assemble(&self, contributions: &[Contribution]) -> Result<Artifact, ComposeError>;

    /// Finishes an artifact once the capability map is known.
    ///
    /// # Errors
    /// Returns [`ComposeError::AspectAssembly`] when the artifact cannot be completed.
    fn inject(&self, artifact: Artifact, _ctx: &InjectContext<'_>) -> Result<Artifact, ComposeError> {
        Ok(artifact)
    }

    /// Wraps the display root handed to the host.
    fn wrap_root(&self, root: Option<Artifact>, _artifact: &Artifact) -> Option<Artifact> {
        root
    }

    /// Releases whatever `inject` started.
    async fn shutdown(&self, _artifact: &Artifact) {}
}

/// Artifacts of a composition, keyed by aspect name.
#[derive(Clone, Default)]
pub struct Artifacts {
    inner: Arc<BTreeMap<String, Artifact>>,
}

impl Artifacts {
    pub(crate) fn from_map(map: BTreeMap<String, Artifact>) -> Self {
        Self { inner: Arc::new(map) }
    }

    #[must_use]
    pub fn get(&self, aspect: &str) -> Option<&Artifact> {
        self.inner.get(aspect)
    }

    /// Artifact of `aspect`, downcast to `T`.
    #[must_use]
    pub fn get_as<T: Any + Send + Sync>(&self, aspect: &str) -> Option<Arc<T>> {
        self.get(aspect).and_then(|artifact| Arc::clone(artifact).downcast::<T>().ok())
    }

    #[must_use]
    pub fn contains(&self, aspect: &str) -> bool {
        self.inner.contains_key(aspect)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.keys()).finish()
    }
}

/// Downcasts a payload, trying `Vec<T>` first and a single `T` second.
pub(crate) fn payload_items<T: Any + Clone>(payload: &AspectPayload) -> Option<Vec<T>> {
    payload
        .downcast_ref::<Vec<T>>()
        .cloned()
        .or_else(|| payload.downcast_ref::<T>().map(|item| vec![item.clone()]))
}
