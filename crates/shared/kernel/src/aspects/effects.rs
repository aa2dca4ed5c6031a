//! The `logic` aspect: collects effect rules into one [`EffectSet`].

use super::{Artifact, Aspect, Contribution, payload_items};
use crate::error::ComposeError;
use crate::features::AspectPayload;
use std::sync::Arc;
use weave_store::{EffectRule, EffectSet};

/// Payload key of the effects aspect.
pub const NAME: &str = "logic";

/// Folds every feature's `Vec<Arc<dyn EffectRule>>` into an [`EffectSet`],
/// keeping feature registration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectsAspect;

impl EffectsAspect {
    fn rules(contribution: &Contribution) -> Result<Vec<Arc<dyn EffectRule>>, ComposeError> {
        payload_items(&contribution.payload).ok_or_else(|| ComposeError::AspectAssembly {
            aspect: NAME.into(),
            message: format!("payload of '{}' is not a list of effect rules", contribution.feature)
                .into(),
            context: None,
        })
    }
}

#[async_trait::async_trait]
impl Aspect for EffectsAspect {
    fn name(&self) -> &str {
        NAME
    }

    fn validate_payload(&self, _feature: &str, payload: &AspectPayload) -> Result<(), String> {
        payload_items::<Arc<dyn EffectRule>>(payload)
            .map(|_| ())
            .ok_or_else(|| "expected Vec<Arc<dyn EffectRule>>".to_owned())
    }

    fn assemble(&self, contributions: &[Contribution]) -> Result<Artifact, ComposeError> {
        let mut set = EffectSet::new();
        for contribution in contributions {
            for rule in Self::rules(contribution)? {
                set.push(contribution.feature.clone(), rule);
            }
        }
        Ok(Arc::new(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use weave_store::rule;

    #[test]
    fn rules_keep_feature_order() {
        let first = Feature::builder("first")
            .rules([rule("a", "go", |_, _| async { Ok(Vec::new()) })])
            .build();
        let second = Feature::builder("second")
            .rules([
                rule("b", "go", |_, _| async { Ok(Vec::new()) }),
                rule("c", "stop", |_, _| async { Ok(Vec::new()) }),
            ])
            .build();

        let aspect = EffectsAspect;
        let contributions = aspect.collect(&[Arc::new(second), Arc::new(first)]);
        let artifact = aspect.assemble(&contributions).unwrap();
        let set = artifact.downcast_ref::<EffectSet>().unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["b", "c", "a"]);
        let owners: Vec<&str> = set.matching("go").map(|(owner, _)| owner).collect();
        assert_eq!(owners, vec!["second", "first"]);
    }

    #[test]
    fn foreign_payload_is_rejected() {
        let payload: AspectPayload = Arc::new(42_u32);
        assert!(EffectsAspect.validate_payload("x", &payload).is_err());
    }
}
