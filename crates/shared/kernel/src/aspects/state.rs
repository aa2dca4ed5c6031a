//! The `reducer` aspect: combines slice reducers and runs the [`Store`].

use super::{Artifact, Artifacts, Aspect, AspectExport, Contribution, InjectContext, effects, payload_items};
use crate::error::ComposeError;
use crate::features::AspectPayload;
use std::sync::Arc;
use tracing::debug;
use weave_domain::fassets::FassetValue;
use weave_store::{CombinedReducer, EffectSet, SliceReducer, SliceSelector, Store};

/// Payload key of the state aspect.
pub const NAME: &str = "reducer";

/// Prefix of the selector fassets published for every slice.
pub const SELECTOR_PREFIX: &str = "state";

/// Operation declared by slice selector fassets.
pub const SELECT_OPERATION: &str = "select";

/// The running store of a composition, if the state aspect took part in it.
#[must_use]
pub fn store(artifacts: &Artifacts) -> Option<Arc<Store>> {
    artifacts.get_as::<Store>(NAME)
}

/// Display root wrapped by the state aspect: makes the store reachable from
/// whatever the host renders.
#[derive(Debug)]
pub struct Provider {
    store: Store,
    child: Option<Artifact>,
}

impl Provider {
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Root produced by the aspects before this one.
    #[must_use]
    pub const fn child(&self) -> Option<&Artifact> {
        self.child.as_ref()
    }
}

/// Assembles a [`CombinedReducer`] from every feature's slices, publishes one
/// `state.<path>` selector per slice, and spawns the [`Store`] on injection.
///
/// Requires a Tokio runtime at injection time.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateAspect;

impl StateAspect {
    fn slices(contribution: &Contribution) -> Result<Vec<SliceReducer>, ComposeError> {
        payload_items(&contribution.payload).ok_or_else(|| ComposeError::AspectAssembly {
            aspect: NAME.into(),
            message: format!("payload of '{}' is not a slice reducer", contribution.feature).into(),
            context: None,
        })
    }
}

#[async_trait::async_trait]
impl Aspect for StateAspect {
    fn name(&self) -> &str {
        NAME
    }

    fn validate_payload(&self, _feature: &str, payload: &AspectPayload) -> Result<(), String> {
        payload_items::<SliceReducer>(payload)
            .map(|_| ())
            .ok_or_else(|| "expected SliceReducer or Vec<SliceReducer>".to_owned())
    }

    fn exports(&self, contributions: &[Contribution]) -> Result<Vec<AspectExport>, ComposeError> {
        let mut exports = Vec::new();
        for contribution in contributions {
            for slice in Self::slices(contribution)? {
                exports.push(AspectExport {
                    feature: contribution.feature.clone(),
                    key: format!("{SELECTOR_PREFIX}.{}", slice.path()),
                    value: FassetValue::new(SliceSelector::new(slice.path().clone()))
                        .with_operations([SELECT_OPERATION]),
                });
            }
        }
        Ok(exports)
    }

    fn assemble(&self, contributions: &[Contribution]) -> Result<Artifact, ComposeError> {
        let mut slices = Vec::new();
        for contribution in contributions {
            slices.extend(Self::slices(contribution)?);
        }
        let reducer = CombinedReducer::new(slices).map_err(|e| ComposeError::AspectAssembly {
            aspect: NAME.into(),
            message: e.to_string().into(),
            context: None,
        })?;
        Ok(Arc::new(reducer))
    }

    fn inject(&self, artifact: Artifact, ctx: &InjectContext<'_>) -> Result<Artifact, ComposeError> {
        let reducer = artifact.downcast::<CombinedReducer>().map_err(|_| {
            ComposeError::AspectAssembly {
                aspect: NAME.into(),
                message: "assembled artifact is not a CombinedReducer".into(),
                context: None,
            }
        })?;
        let rules = ctx
            .artifacts
            .get_as::<EffectSet>(effects::NAME)
            .map(|rules| (*rules).clone())
            .unwrap_or_default();

        debug!(slices = reducer.len(), rules = rules.len(), "Spawning store");
        let store = Store::builder()
            .reducer((*reducer).clone())
            .rules(rules)
            .fassets(ctx.fassets.clone())
            .config(ctx.config.dispatch.clone())
            .spawn()
            .map_err(|e| ComposeError::AspectAssembly {
                aspect: NAME.into(),
                message: e.to_string().into(),
                context: None,
            })?;
        Ok(Arc::new(store))
    }

    fn wrap_root(&self, root: Option<Artifact>, artifact: &Artifact) -> Option<Artifact> {
        match artifact.downcast_ref::<Store>() {
            Some(store) => Some(Arc::new(Provider { store: store.clone(), child: root })),
            None => root,
        }
    }

    async fn shutdown(&self, artifact: &Artifact) {
        if let Some(store) = artifact.downcast_ref::<Store>() {
            store.shutdown().await;
        }
    }
}
