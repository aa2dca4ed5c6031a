use weave_kernel::aspects::{EffectsAspect, StateAspect};
use weave_kernel::compose::{Composition, compose_application};
use weave_kernel::domain::capabilities::{LOG_OPERATION, LOGGER_KEY, SharedLogSink};
use weave_kernel::domain::intent::Intent;
use weave_kernel::hooks::HookError;
use weave_kernel::lifecycle::Phase;
use weave_log_intents::{NAME, feature};

#[tokio::test]
async fn test_logger_capability_is_published() {
    let app = compose_application(Composition::builder().feature(feature()).build()).await.unwrap();

    let logger = app.fassets().get(LOGGER_KEY).unwrap();
    assert!(logger.provides(LOG_OPERATION));
    assert!(logger.is::<SharedLogSink>());
    assert_eq!(app.fassets().owner(LOGGER_KEY), Some(NAME));
    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_store_is_a_recoverable_start_failure() {
    let app = compose_application(Composition::builder().feature(feature()).build()).await.unwrap();

    assert_eq!(app.phase(), Phase::Running);
    let failures = app.hook_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].feature, NAME);
    assert!(matches!(failures[0].error, HookError::Failed { fatal: false, .. }));
    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_logging_follows_the_store_until_shutdown() {
    let app = compose_application(
        Composition::builder()
            .feature(feature())
            .aspect(StateAspect)
            .aspect(EffectsAspect)
            .build(),
    )
    .await
    .unwrap();
    assert!(app.hook_failures().is_empty());

    let store = app.store().unwrap();
    app.dispatch(Intent::bare("app.ready")).unwrap();
    store.settled().await;

    app.shutdown().await.unwrap();
    assert!(!store.is_running());
}
