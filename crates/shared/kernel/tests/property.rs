use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use weave_kernel::aspects::{Aspect, AspectPipeline, EffectsAspect, StateAspect, effects, state};
use weave_kernel::contracts::{ContractRegistry, FassetImport};
use weave_kernel::domain::fassets::{FassetValue, Resolved};
use weave_kernel::domain::intent::Intent;
use weave_kernel::features::{Feature, FeatureRegistry};
use weave_kernel::store::{CombinedReducer, EffectSet, SliceReducer, StateTree, rule};

const KINDS: [&str; 3] = ["k0", "k1", "k2"];

/// Features `f0..fn`, each defining its own key, contributing to `menu` and
/// importing the previous feature's key.
fn features(orders: &[i32]) -> Vec<Feature> {
    orders
        .iter()
        .enumerate()
        .map(|(i, &order)| {
            let mut builder = Feature::builder(format!("f{i}"))
                .define(format!("key.{i}"), FassetValue::new(i))
                .contribute("menu", order, FassetValue::new(format!("item-{i}")));
            if i > 0 {
                builder = builder.uses(FassetImport::required(format!("key.{}", i - 1)));
            }
            builder.uses(FassetImport::optional("menu")).build()
        })
        .collect()
}

fn resolve(features: &[Feature]) -> Vec<(String, Vec<String>)> {
    let mut registry = FeatureRegistry::new();
    for feature in features {
        registry.add(feature.clone()).unwrap();
    }
    let mut contracts = ContractRegistry::new();
    for feature in registry.active_features() {
        contracts.register_exports(feature.name(), feature.exports()).unwrap();
        contracts.register_imports(feature.name(), feature.uses()).unwrap();
    }
    let fassets = contracts.resolve().unwrap();

    fassets
        .keys()
        .map(|key| {
            let owners = match fassets.entry(key).unwrap() {
                Resolved::Single { owner, .. } => vec![owner.clone()],
                Resolved::Many(items) => items.iter().map(|c| c.owner.clone()).collect(),
            };
            (key.to_owned(), owners)
        })
        .collect()
}

/// Features `f0..fn`, each owning slice `s<i>` and one rule, both keyed on
/// `KINDS[i % 3]`. The slice keeps a running total scaled by `weights[i]`.
fn sliced_features(weights: &[u32]) -> Vec<Feature> {
    weights
        .iter()
        .enumerate()
        .map(|(i, &weight)| {
            let kind = KINDS[i % KINDS.len()];
            let slice = SliceReducer::typed(&format!("s{i}"), 0_u32, move |total, intent| {
                if intent.kind() == kind { total * 2 + weight } else { total }
            })
            .unwrap();
            Feature::builder(format!("f{i}"))
                .slice(slice)
                .rules([rule(format!("r{i}"), kind, |_, _| async { Ok(Vec::new()) })])
                .build()
        })
        .collect()
}

/// Initial tree, tree after a fixed intent sequence, and the rule owners per intent type.
fn assemble(features: &[Feature]) -> (StateTree, StateTree, Vec<BTreeSet<(String, String)>>) {
    let mut registry = FeatureRegistry::new();
    for feature in features {
        registry.add(feature.clone()).unwrap();
    }
    let aspects: Vec<Arc<dyn Aspect>> = vec![Arc::new(StateAspect), Arc::new(EffectsAspect)];
    let pipeline = AspectPipeline::new(aspects).unwrap();
    let artifacts = pipeline.assemble(&pipeline.collect(&registry.active_features())).unwrap();

    let reducer = artifacts.get_as::<CombinedReducer>(state::NAME).unwrap();
    let initial = reducer.initial_state();
    let reduced = ["k0", "k1", "k0", "k2", "k1", "k0"]
        .iter()
        .fold(initial.clone(), |tree, kind| reducer.reduce(&tree, &Intent::bare(*kind)));

    let rules = artifacts.get_as::<EffectSet>(effects::NAME).unwrap();
    let owners = KINDS
        .iter()
        .map(|kind| {
            rules
                .matching(kind)
                .map(|(owner, rule)| (owner.to_owned(), rule.name().to_owned()))
                .collect()
        })
        .collect();
    (initial, reduced, owners)
}

proptest! {
    #[test]
    fn assembled_artifacts_ignore_registration_order(
        (weights, shuffled) in proptest::collection::vec(0_u32..5, 1..8)
            .prop_flat_map(|weights| {
                let indices: Vec<usize> = (0..weights.len()).collect();
                (Just(weights), Just(indices).prop_shuffle())
            })
    ) {
        let declared = sliced_features(&weights);
        let permuted: Vec<Feature> = shuffled.iter().map(|&i| declared[i].clone()).collect();

        prop_assert_eq!(assemble(&declared), assemble(&permuted));
    }

    #[test]
    fn resolution_ignores_registration_order(
        (orders, shuffled) in proptest::collection::vec(-3_i32..3, 1..8)
            .prop_flat_map(|orders| {
                let indices: Vec<usize> = (0..orders.len()).collect();
                (Just(orders), Just(indices).prop_shuffle())
            })
    ) {
        let declared = features(&orders);
        let permuted: Vec<Feature> = shuffled.iter().map(|&i| declared[i].clone()).collect();

        prop_assert_eq!(resolve(&declared), resolve(&permuted));
    }

    #[test]
    fn duplicate_export_error_ignores_registration_order(swap in any::<bool>()) {
        let mut themes = vec![
            Feature::builder("dark").define("theme", FassetValue::new("black")).build(),
            Feature::builder("light").define("theme", FassetValue::new("white")).build(),
        ];
        if swap {
            themes.reverse();
        }
        let mut contracts = ContractRegistry::new();
        let mut outcome = Ok(());
        for feature in &themes {
            outcome = outcome.and_then(|()| contracts.register_exports(feature.name(), feature.exports()));
        }
        prop_assert_eq!(
            outcome.unwrap_err().to_string(),
            "Duplicate export: 'theme' is exported by 'dark' and 'light'"
        );
    }
}
