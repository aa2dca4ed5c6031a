pub mod fixtures;

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;
    use weave_domain::intent::Intent;
    use weave_store::*;

    #[tokio::test]
    async fn test_rule_sees_state_after_reduction() {
        let mut rules = EffectSet::new();
        rules.push(
            "current-view",
            rule("announce", "view.change", |ctx, _intent| async move {
                let view = ctx.state().select::<String>("currentView").unwrap_or_default();
                Ok(vec![Intent::new("view.changed", serde_json::json!({ "viewName": view }))])
            }),
        );
        let store = Store::builder()
            .reducer(reducer(vec![current_view(), journal()]))
            .rules(rules)
            .spawn()
            .unwrap();
        let mut intents = store.subscribe_intents();

        store.dispatch(change_view("list")).unwrap();
        store.settled().await;

        let first = intents.next().await.unwrap();
        let second = intents.next().await.unwrap();
        assert_eq!(first.kind(), "view.change");
        assert_eq!(second.kind(), "view.changed");
        assert_eq!(second.field_str("viewName"), Some("list"));
        assert_eq!(
            store.state().select::<Vec<String>>("journal").unwrap(),
            vec!["view.change", "view.changed"]
        );
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_failing_rules_are_isolated() {
        let mut rules = EffectSet::new();
        rules.push("a", rule("rejects", "go", |_, _| async { Err(EffectError::from("nope")) }));
        rules.push(
            "b",
            rule("panics", "go", |_, _| async {
                if true {
                    panic!("rule exploded");
                }
                Ok(Vec::new())
            }),
        );
        rules.push("c", rule("works", "go", |_, _| async { Ok(vec![Intent::bare("done")]) }));

        let store = Store::builder()
            .reducer(reducer(vec![counter("go", "go"), counter("done", "done")]))
            .rules(rules)
            .spawn()
            .unwrap();
        let mut failures = store.subscribe_failures();

        store.dispatch(Intent::bare("go")).unwrap();
        store.settled().await;

        let state = store.state();
        assert_eq!(state.select::<u32>("go"), Some(1));
        assert_eq!(state.select::<u32>("done"), Some(1));

        let mut failed = vec![
            failures.next().await.unwrap().rule.clone().unwrap(),
            failures.next().await.unwrap().rule.clone().unwrap(),
        ];
        failed.sort();
        assert_eq!(failed, vec!["panics", "rejects"]);
        assert!(failures.try_recv().is_err());

        // The store keeps working after failures.
        store.dispatch(Intent::bare("go")).unwrap();
        store.settled().await;
        assert_eq!(store.state().select::<u32>("go"), Some(2));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_rules_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let mut rules = EffectSet::new();
        for name in ["left", "right"] {
            let barrier = Arc::clone(&barrier);
            rules.push(
                name,
                rule(name, "sync", move |_, _| {
                    let barrier = Arc::clone(&barrier);
                    async move {
                        barrier.wait().await;
                        Ok(Vec::new())
                    }
                }),
            );
        }
        let store = Store::builder().rules(rules).spawn().unwrap();

        store.dispatch(Intent::bare("sync")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), store.settled())
            .await
            .expect("both rules must reach the barrier together");
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_chain_depth_limit_drops_emission() {
        let mut rules = EffectSet::new();
        rules.push("echo", rule("echo", "ping", |_, _| async { Ok(vec![Intent::bare("ping")]) }));
        let store = Store::builder()
            .reducer(reducer(vec![counter("pings", "ping")]))
            .rules(rules)
            .config(dispatch_config(Some(3), false))
            .spawn()
            .unwrap();
        let mut failures = store.subscribe_failures();

        store.dispatch(Intent::bare("ping")).unwrap();
        store.settled().await;

        assert_eq!(store.state().select::<u32>("pings"), Some(4));
        let failure = failures.next().await.unwrap();
        assert!(matches!(failure.error, StoreError::ChainDepthExceeded { depth: 4, .. }));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_reducer_keeps_slice_and_store_alive() {
        let fragile = SliceReducer::typed("fragile", 0_u32, |n, intent| {
            assert!(intent.kind() != "kaboom", "reducer exploded");
            n + 1
        })
        .unwrap();
        let store = Store::builder()
            .reducer(reducer(vec![fragile, journal()]))
            .spawn()
            .unwrap();
        let mut failures = store.subscribe_failures();

        store.dispatch(Intent::bare("kaboom")).unwrap();
        tokio::time::timeout(Duration::from_secs(2), store.settled())
            .await
            .expect("store settles after a reducer panic");

        let failure = failures.next().await.unwrap();
        assert!(failure.feature.is_none());
        assert_eq!(failure.intent.kind(), "kaboom");
        assert!(matches!(
            &failure.error,
            StoreError::ReducerPanicked { slice, message, .. }
                if slice == "fragile" && message.contains("reducer exploded")
        ));
        assert_eq!(store.state().select::<u32>("fragile"), Some(0));
        assert_eq!(store.state().select::<Vec<String>>("journal").unwrap(), vec!["kaboom"]);

        store.dispatch(Intent::bare("tick")).unwrap();
        store.settled().await;
        assert_eq!(store.state().select::<u32>("fragile"), Some(1));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_cycle_detection_drops_repeated_type() {
        let mut rules = EffectSet::new();
        rules.push("ab", rule("a-to-b", "a", |_, _| async { Ok(vec![Intent::bare("b")]) }));
        rules.push("ba", rule("b-to-a", "b", |_, _| async { Ok(vec![Intent::bare("a")]) }));
        let store = Store::builder()
            .reducer(reducer(vec![journal()]))
            .rules(rules)
            .config(dispatch_config(None, true))
            .spawn()
            .unwrap();
        let mut failures = store.subscribe_failures();

        store.dispatch(Intent::bare("a")).unwrap();
        store.settled().await;

        assert_eq!(store.state().select::<Vec<String>>("journal").unwrap(), vec!["a", "b"]);
        let failure = failures.next().await.unwrap();
        assert_eq!(failure.rule.as_deref(), Some("b-to-a"));
        assert!(failure.error.to_string().contains("a -> b -> a"));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_ordering_is_preserved() {
        let store = Store::builder().reducer(reducer(vec![journal()])).spawn().unwrap();
        let expected: Vec<String> = (0..100).map(|i| format!("step.{i}")).collect();

        for kind in &expected {
            store.dispatch(Intent::bare(kind.clone())).unwrap();
        }
        store.settled().await;

        assert_eq!(store.state().select::<Vec<String>>("journal").unwrap(), expected);
        store.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatchers() {
        let store = Store::builder().reducer(reducer(vec![counter("hits", "hit")])).spawn().unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.dispatch(Intent::bare("hit")).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        store.settled().await;

        assert_eq!(store.state().select::<u32>("hits"), Some(200));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_watchers_see_changes_only() {
        let store = Store::builder().reducer(reducer(vec![current_view()])).spawn().unwrap();
        let mut watcher = store.subscribe_state();

        store.dispatch(Intent::bare("unrelated")).unwrap();
        store.dispatch(change_view("settings")).unwrap();
        store.settled().await;

        let snapshot = watcher.next().await.unwrap();
        assert_eq!(snapshot.select::<String>("currentView").as_deref(), Some("settings"));
        assert!(!watcher.has_changed().unwrap());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_store() {
        let store = Store::builder().reducer(reducer(vec![current_view()])).spawn().unwrap();
        store.dispatch(change_view("list")).unwrap();
        store.settled().await;

        store.shutdown().await;
        assert!(!store.is_running());
        assert!(matches!(store.dispatch(change_view("other")), Err(StoreError::Closed { .. })));
        store.settled().await;
        store.shutdown().await;

        assert_eq!(store.state().select::<String>("currentView").as_deref(), Some("list"));
        let mut intents = store.subscribe_intents();
        assert!(intents.next().await.is_none());
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let err = Store::builder().spawn().expect_err("no runtime");
        assert!(matches!(err, StoreError::Closed { .. }));
    }
}
