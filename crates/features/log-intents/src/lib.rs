//! Intent logging feature slice.
//!
//! Defines the `logger` capability backed by `tracing` and, once started,
//! logs every intent the store processes until the store shuts down.

mod error;

pub use crate::error::{LogIntentsError, LogIntentsErrorExt};

use std::sync::Arc;
use tracing::{debug, info};
use weave_kernel::domain::capabilities::{LOG_OPERATION, LOGGER_KEY, LogSink, SharedLogSink};
use weave_kernel::domain::fassets::FassetValue;
use weave_kernel::features::Feature;
use weave_kernel::hooks::{HookError, StartContext};
use weave_kernel::store::ObserverExt;

pub const NAME: &str = "log-intents";

/// `tracing`-backed [`LogSink`] published under `logger`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentLogger;

impl LogSink for IntentLogger {
    fn log(&self, source: &str, message: &str) {
        info!(source, "{message}");
    }
}

/// Declares the feature.
#[must_use]
pub fn feature() -> Feature {
    let sink: SharedLogSink = Arc::new(IntentLogger);
    Feature::builder(NAME)
        .define(LOGGER_KEY, FassetValue::new(sink).with_operations([LOG_OPERATION]))
        .on_start(start)
        .build()
}

async fn start(ctx: StartContext) -> Result<(), HookError> {
    let store = ctx.store().ok_or_else(|| LogIntentsError::StoreUnavailable {
        message: "no store to observe; intents will not be logged".into(),
        context: Some("on_start".into()),
    })?;
    let logger = ctx
        .fassets()
        .get_as::<SharedLogSink>(LOGGER_KEY)
        .map_or_else(|| Arc::new(IntentLogger) as SharedLogSink, |sink| (*sink).clone());

    let mut intents = store.subscribe_intents();
    tokio::spawn(async move {
        while let Some(intent) = intents.next().await {
            logger.log(NAME, &format!("{} {}", intent.kind(), intent.payload()));
        }
        debug!("Intent log stopped");
    });

    ctx.status().report("logging intents");
    Ok(())
}
