use super::{Artifact, Artifacts, Aspect, AspectExport, Contribution, InjectContext};
use crate::error::{ComposeError, ComposeErrorExt};
use crate::features::Feature;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use weave_domain::config::WeaveConfig;
use weave_domain::fassets::Fassets;

/// Payloads gathered for every aspect, in aspect order.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    entries: Vec<(String, Vec<Contribution>)>,
}

impl Collected {
    /// Contributions collected for `aspect`.
    #[must_use]
    pub fn contributions(&self, aspect: &str) -> &[Contribution] {
        self.entries
            .iter()
            .find(|(name, _)| name == aspect)
            .map_or(&[], |(_, contributions)| contributions.as_slice())
    }
}

/// Ordered set of aspects, unique by name.
#[derive(Debug, Default, Clone)]
pub struct AspectPipeline {
    aspects: Vec<Arc<dyn Aspect>>,
}

impl AspectPipeline {
    /// # Errors
    /// Returns [`ComposeError::AspectAssembly`] if two aspects share a name.
    pub fn new<I>(aspects: I) -> Result<Self, ComposeError>
    where
        I: IntoIterator<Item = Arc<dyn Aspect>>,
    {
        let mut pipeline = Self::default();
        for aspect in aspects {
            pipeline.push(aspect)?;
        }
        Ok(pipeline)
    }

    /// # Errors
    /// Returns [`ComposeError::AspectAssembly`] if the name is already taken.
    pub fn push(&mut self, aspect: Arc<dyn Aspect>) -> Result<(), ComposeError> {
        if self.aspects.iter().any(|known| known.name() == aspect.name()) {
            return Err(ComposeError::AspectAssembly {
                aspect: aspect.name().to_owned().into(),
                message: "an aspect with this name is already registered".into(),
                context: None,
            });
        }
        trace!(aspect = aspect.name(), "Aspect registered");
        self.aspects.push(aspect);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aspects.iter().map(|aspect| aspect.name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aspects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }

    /// Runs every aspect's payload check. Payloads for unknown aspects are
    /// ignored with a warning.
    ///
    /// # Errors
    /// Returns [`ComposeError::InvalidFeature`] naming the feature and aspect.
    pub fn validate_payloads(&self, features: &[Arc<Feature>]) -> Result<(), ComposeError> {
        for feature in features {
            for name in feature.payload_aspects() {
                let Some(aspect) = self.aspects.iter().find(|aspect| aspect.name() == name) else {
                    warn!(feature = feature.name(), aspect = name, "Payload for unknown aspect ignored");
                    continue;
                };
                let Some(payload) = feature.payload(name) else { continue };
                aspect.validate_payload(feature.name(), payload).map_err(|message| {
                    ComposeError::InvalidFeature {
                        feature: feature.name().to_owned().into(),
                        message: message.into(),
                        context: Some(format!("aspect '{name}'").into()),
                    }
                })?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn collect(&self, features: &[Arc<Feature>]) -> Collected {
        let entries = self
            .aspects
            .iter()
            .map(|aspect| {
                let contributions = aspect.collect(features);
                trace!(aspect = aspect.name(), contributions = contributions.len(), "Payloads collected");
                (aspect.name().to_owned(), contributions)
            })
            .collect();
        Collected { entries }
    }

    /// Fassets published by aspects.
    ///
    /// # Errors
    /// Propagates the first aspect error.
    pub fn exports(&self, collected: &Collected) -> Result<Vec<AspectExport>, ComposeError> {
        let mut exports = Vec::new();
        for aspect in &self.aspects {
            exports.extend(aspect.exports(collected.contributions(aspect.name()))?);
        }
        Ok(exports)
    }

    /// Assembles every aspect. Pure: calling it twice yields equivalent artifacts.
    ///
    /// # Errors
    /// Propagates the first aspect error.
    pub fn assemble(&self, collected: &Collected) -> Result<Artifacts, ComposeError> {
        let mut artifacts = BTreeMap::new();
        for aspect in &self.aspects {
            let name = aspect.name();
            let artifact = aspect
                .assemble(collected.contributions(name))
                .context(format!("assembling '{name}'"))?;
            debug!(aspect = name, "Aspect assembled");
            artifacts.insert(name.to_owned(), artifact);
        }
        Ok(Artifacts::from_map(artifacts))
    }

    /// Second pass with the resolved capability map.
    ///
    /// If an aspect fails, the artifacts injected so far are shut down before
    /// the error is returned.
    ///
    /// # Errors
    /// Propagates the first aspect error.
    pub async fn inject(
        &self,
        assembled: &Artifacts,
        fassets: &Fassets,
        config: &WeaveConfig,
    ) -> Result<Artifacts, ComposeError> {
        let ctx = InjectContext { fassets, artifacts: assembled, config };
        let mut injected: BTreeMap<String, Artifact> = BTreeMap::new();
        let mut done: Vec<&Arc<dyn Aspect>> = Vec::new();

        for aspect in &self.aspects {
            let name = aspect.name();
            let Some(artifact) = assembled.get(name) else { continue };
            match aspect.inject(Arc::clone(artifact), &ctx) {
                Ok(artifact) => {
                    trace!(aspect = name, "Aspect injected");
                    injected.insert(name.to_owned(), artifact);
                    done.push(aspect);
                },
                Err(e) => {
                    for previous in done.iter().rev() {
                        if let Some(artifact) = injected.get(previous.name()) {
                            previous.shutdown(artifact).await;
                        }
                    }
                    return Err(e).context(format!("injecting '{name}'"));
                },
            }
        }
        Ok(Artifacts::from_map(injected))
    }

    /// Folds the display root through every aspect, in order.
    #[must_use]
    pub fn wrap_root(&self, artifacts: &Artifacts) -> Option<Artifact> {
        self.aspects.iter().fold(None, |root, aspect| match artifacts.get(aspect.name()) {
            Some(artifact) => aspect.wrap_root(root, artifact),
            None => root,
        })
    }

    /// Shuts aspects down in reverse order.
    pub async fn shutdown(&self, artifacts: &Artifacts) {
        for aspect in self.aspects.iter().rev() {
            if let Some(artifact) = artifacts.get(aspect.name()) {
                debug!(aspect = aspect.name(), "Shutting down aspect");
                aspect.shutdown(artifact).await;
            }
        }
    }
}
