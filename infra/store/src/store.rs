use crate::effect::{EffectContext, EffectRule, EffectSet};
use crate::error::StoreError;
use crate::state::{CombinedReducer, StateTree};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, trace, warn};
use weave_domain::config::DispatchConfig;
use weave_domain::fassets::Fassets;
use weave_domain::intent::Intent;

const MIN_CAPACITY: usize = 1;

/// A rule failure, a panicking slice reducer or a dropped emission, published
/// to failure subscribers.
#[derive(Debug)]
pub struct EffectFailure {
    /// Feature that registered the rule, if the failure came from a rule.
    pub feature: Option<String>,
    pub rule: Option<String>,
    /// Intent that triggered the rule or, for dropped emissions, the emitted intent.
    pub intent: Arc<Intent>,
    pub error: StoreError,
}

#[derive(Debug)]
struct Envelope {
    intent: Arc<Intent>,
    depth: usize,
    /// Types of the ancestors of `intent`, oldest first.
    chain: Arc<Vec<String>>,
}

#[derive(Debug)]
enum Command {
    Dispatch(Envelope),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug)]
struct Observers {
    intents: broadcast::Sender<Arc<Intent>>,
    failures: broadcast::Sender<Arc<EffectFailure>>,
}

#[derive(Debug)]
struct Shared {
    queue: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Arc<StateTree>>,
    /// Dropped on shutdown so observers see the end of the stream.
    observers: Mutex<Option<Observers>>,
    /// Queued intents plus running rules.
    pending: Arc<watch::Sender<usize>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running intent dispatcher.
///
/// Intents are reduced one at a time in arrival order; matching effect rules
/// then run concurrently on their own tasks. Cloning is cheap and every clone
/// talks to the same dispatcher.
///
/// # Examples
/// ```rust
/// use weave_store::{CombinedReducer, SliceReducer, Store};
/// use weave_domain::intent::Intent;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), weave_store::StoreError> {
/// let view = SliceReducer::typed("currentView", "home".to_owned(), |view, intent| {
///     intent.field_str("viewName").map_or(view, str::to_owned)
/// })?;
/// let store = Store::builder().reducer(CombinedReducer::new(vec![view])?).spawn()?;
///
/// store.dispatch(Intent::new("view.change", json!({ "viewName": "list" })))?;
/// store.settled().await;
/// assert_eq!(store.state().select::<String>("currentView").as_deref(), Some("list"));
/// store.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

/// Configures and starts a [`Store`].
#[derive(Debug, Default)]
pub struct StoreBuilder {
    reducer: CombinedReducer,
    rules: EffectSet,
    fassets: Fassets,
    config: DispatchConfig,
}

impl StoreBuilder {
    #[must_use]
    pub fn reducer(mut self, reducer: CombinedReducer) -> Self {
        self.reducer = reducer;
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: EffectSet) -> Self {
        self.rules = rules;
        self
    }

    /// Capabilities handed to every effect rule.
    #[must_use]
    pub fn fassets(mut self, fassets: Fassets) -> Self {
        self.fassets = fassets;
        self
    }

    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the dispatcher task on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] when called outside a Tokio runtime.
    pub fn spawn(self) -> Result<Store, StoreError> {
        let runtime = Handle::try_current().map_err(|e| StoreError::Closed {
            message: e.to_string().into(),
            context: Some("Store requires a Tokio runtime".into()),
        })?;

        let (state_tx, state_rx) = watch::channel(Arc::new(self.reducer.initial_state()));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (intents, _) = broadcast::channel(checked_capacity(self.config.intent_capacity));
        let (failures, _) = broadcast::channel(checked_capacity(self.config.failure_capacity));
        let pending = Arc::new(watch::channel(0_usize).0);

        debug!(
            slices = self.reducer.len(),
            rules = self.rules.len(),
            max_chain_depth = ?self.config.max_chain_depth,
            detect_cycles = self.config.detect_cycles,
            "Starting intent dispatcher"
        );

        let dispatcher = Dispatcher {
            reducer: self.reducer,
            rules: self.rules,
            fassets: self.fassets,
            config: self.config,
            queue: queue_tx.downgrade(),
            state: state_tx,
            intents: intents.clone(),
            failures: failures.clone(),
            pending: Arc::clone(&pending),
        };
        let task = runtime.spawn(dispatcher.run(queue_rx));

        Ok(Store {
            shared: Arc::new(Shared {
                queue: queue_tx,
                state: state_rx,
                observers: Mutex::new(Some(Observers { intents, failures })),
                pending,
                task: Mutex::new(Some(task)),
            }),
        })
    }
}

impl Store {
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Queues an intent for reduction.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] once the store has shut down.
    pub fn dispatch(&self, intent: Intent) -> Result<(), StoreError> {
        let envelope = Envelope { intent: Arc::new(intent), depth: 0, chain: Arc::default() };
        self.shared.pending.send_modify(|n| *n += 1);
        self.shared.queue.send(Command::Dispatch(envelope)).map_err(|e| {
            self.shared.pending.send_modify(|n| *n = n.saturating_sub(1));
            let kind = match e.0 {
                Command::Dispatch(envelope) => envelope.intent.kind().to_owned(),
                Command::Shutdown(_) => String::new(),
            };
            StoreError::Closed {
                message: format!("intent '{kind}' was not accepted").into(),
                context: None,
            }
        })
    }

    /// Latest state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<StateTree> {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified after every reduction that changed the state.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<Arc<StateTree>> {
        let mut receiver = self.shared.state.clone();
        receiver.mark_unchanged();
        receiver
    }

    /// Every reduced intent, in reduction order.
    #[must_use]
    pub fn subscribe_intents(&self) -> broadcast::Receiver<Arc<Intent>> {
        self.shared
            .observers
            .lock()
            .as_ref()
            .map_or_else(|| broadcast::channel(MIN_CAPACITY).1, |o| o.intents.subscribe())
    }

    /// Failed rules and dropped emissions.
    #[must_use]
    pub fn subscribe_failures(&self) -> broadcast::Receiver<Arc<EffectFailure>> {
        self.shared
            .observers
            .lock()
            .as_ref()
            .map_or_else(|| broadcast::channel(MIN_CAPACITY).1, |o| o.failures.subscribe())
    }

    /// Returns `true` until [`Store::shutdown`] completes.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shared.queue.is_closed()
    }

    /// Resolves once no intent is queued and no rule is running.
    pub async fn settled(&self) {
        let mut pending = self.shared.pending.subscribe();
        if pending.wait_for(|n| *n == 0).await.is_err() {
            trace!("Pending counter closed while waiting for the store to settle");
        }
    }

    /// Stops accepting intents, waits for running rules and stops the dispatcher.
    ///
    /// Intents emitted by rules that finish during shutdown are dropped.
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.shared.queue.send(Command::Shutdown(ack_tx)).is_ok() && ack_rx.await.is_err() {
            debug!("Dispatcher exited before acknowledging shutdown");
        }
        let task = self.shared.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Intent dispatcher task failed");
        }
        self.shared.observers.lock().take();
    }
}

#[derive(Debug)]
struct RuleMeta {
    feature: String,
    rule: String,
    trigger: Arc<Intent>,
    depth: usize,
    chain: Arc<Vec<String>>,
}

#[derive(Debug)]
struct RuleOutcome {
    meta: RuleMeta,
    result: Result<Vec<Intent>, String>,
}

struct Dispatcher {
    reducer: CombinedReducer,
    rules: EffectSet,
    fassets: Fassets,
    config: DispatchConfig,
    queue: mpsc::WeakUnboundedSender<Command>,
    state: watch::Sender<Arc<StateTree>>,
    intents: broadcast::Sender<Arc<Intent>>,
    failures: broadcast::Sender<Arc<EffectFailure>>,
    pending: Arc<watch::Sender<usize>>,
}

impl Dispatcher {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<Command>) {
        let mut tasks = JoinSet::new();

        let ack = loop {
            tokio::select! {
                command = queue.recv() => match command {
                    Some(Command::Dispatch(envelope)) => self.process(&envelope, &mut tasks),
                    Some(Command::Shutdown(ack)) => break Some(ack),
                    None => break None,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => self.complete(joined, true),
            }
        };

        queue.close();
        let mut dropped = 0_usize;
        while let Ok(command) = queue.try_recv() {
            match command {
                Command::Dispatch(_) => dropped += 1,
                Command::Shutdown(other) => {
                    let _ = other.send(());
                },
            }
        }
        if dropped > 0 {
            debug!(dropped, "Queued intents discarded on shutdown");
        }

        while let Some(joined) = tasks.join_next().await {
            self.complete(joined, false);
        }
        self.pending.send_replace(0);
        debug!("Intent dispatcher stopped");

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    fn process(&self, envelope: &Envelope, tasks: &mut JoinSet<RuleOutcome>) {
        let intent = &envelope.intent;

        let current = self.state.borrow().clone();
        let (next, failures) = self.reducer.reduce_isolated(&current, intent);
        for error in failures {
            self.report(EffectFailure { feature: None, rule: None, intent: Arc::clone(intent), error });
        }
        if next != *current {
            self.state.send_replace(Arc::new(next));
        }
        trace!(intent = intent.kind(), depth = envelope.depth, "Intent reduced");

        if self.intents.send(Arc::clone(intent)).is_err() {
            trace!(intent = intent.kind(), "No intent observers");
        }

        let matched: Vec<(String, Arc<dyn EffectRule>)> = self
            .rules
            .matching(intent.kind())
            .map(|(owner, rule)| (owner.to_owned(), Arc::clone(rule)))
            .collect();
        self.pending.send_modify(|n| *n += matched.len());
        for (feature, rule) in matched {
            self.spawn_rule(tasks, feature, rule, envelope);
        }

        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    fn spawn_rule(
        &self,
        tasks: &mut JoinSet<RuleOutcome>,
        feature: String,
        rule: Arc<dyn EffectRule>,
        envelope: &Envelope,
    ) {
        let ctx = EffectContext::new(self.fassets.clone(), self.state.subscribe(), envelope.depth);
        let trigger = Arc::clone(&envelope.intent);
        let meta = RuleMeta {
            feature,
            rule: rule.name().to_owned(),
            trigger: Arc::clone(&trigger),
            depth: envelope.depth,
            chain: Arc::clone(&envelope.chain),
        };
        trace!(rule = %meta.rule, intent = trigger.kind(), "Running effect rule");

        // The inner task isolates panics so the outcome always carries its metadata.
        tasks.spawn(async move {
            let run = tokio::spawn(async move { rule.run(ctx, trigger).await });
            let result = match run.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(join_failure(e)),
            };
            RuleOutcome { meta, result }
        });
    }

    fn complete(&self, joined: Result<RuleOutcome, JoinError>, accepting: bool) {
        match joined {
            Ok(RuleOutcome { meta, result: Ok(emitted) }) => {
                trace!(rule = %meta.rule, emitted = emitted.len(), "Effect rule finished");
                for intent in emitted {
                    if accepting {
                        self.forward(&meta, intent);
                    } else {
                        debug!(rule = %meta.rule, intent = intent.kind(), "Emission dropped during shutdown");
                    }
                }
            },
            Ok(RuleOutcome { meta, result: Err(message) }) => {
                let error = StoreError::EffectRule {
                    rule: meta.rule.clone().into(),
                    intent: meta.trigger.kind().to_owned().into(),
                    message: message.into(),
                    context: Some(format!("feature '{}'", meta.feature).into()),
                };
                self.report(EffectFailure {
                    feature: Some(meta.feature),
                    rule: Some(meta.rule),
                    intent: meta.trigger,
                    error,
                });
            },
            Err(e) => warn!(error = %e, "Effect rule supervisor failed"),
        }
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Applies the chain policy to an emitted intent and queues it.
    fn forward(&self, meta: &RuleMeta, intent: Intent) {
        let intent = Arc::new(intent);
        let depth = meta.depth + 1;

        if let Some(max) = self.config.max_chain_depth
            && depth > max
        {
            let error = StoreError::ChainDepthExceeded {
                intent: intent.kind().to_owned().into(),
                depth,
                context: Some(format!("limit {max}").into()),
            };
            self.report(EffectFailure {
                feature: Some(meta.feature.clone()),
                rule: Some(meta.rule.clone()),
                intent,
                error,
            });
            return;
        }

        let mut chain = Vec::with_capacity(meta.chain.len() + 1);
        chain.extend(meta.chain.iter().cloned());
        chain.push(meta.trigger.kind().to_owned());

        if self.config.detect_cycles && chain.iter().any(|kind| kind == intent.kind()) {
            chain.push(intent.kind().to_owned());
            let error =
                StoreError::CycleDetected { chain: chain.join(" -> ").into(), context: None };
            self.report(EffectFailure {
                feature: Some(meta.feature.clone()),
                rule: Some(meta.rule.clone()),
                intent,
                error,
            });
            return;
        }

        let Some(queue) = self.queue.upgrade() else {
            debug!(intent = intent.kind(), "Store handles dropped; emission discarded");
            return;
        };
        self.pending.send_modify(|n| *n += 1);
        let envelope = Envelope { intent, depth, chain: Arc::new(chain) };
        if queue.send(Command::Dispatch(envelope)).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    fn report(&self, failure: EffectFailure) {
        warn!(
            feature = failure.feature.as_deref().unwrap_or("-"),
            rule = failure.rule.as_deref().unwrap_or("-"),
            intent = failure.intent.kind(),
            error = %failure.error,
            "Effect failure"
        );
        if self.failures.send(Arc::new(failure)).is_err() {
            trace!("No failure observers");
        }
    }
}

fn join_failure(error: JoinError) -> String {
    if error.is_panic() {
        let payload = error.into_panic();
        format!("rule panicked: {}", panic_message(&*payload))
    } else {
        format!("rule task cancelled: {error}")
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn checked_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        warn!(capacity, "Channel capacity must be >= {MIN_CAPACITY}; using the minimum");
        return MIN_CAPACITY;
    }
    capacity
}
