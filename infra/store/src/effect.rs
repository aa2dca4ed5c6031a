use crate::state::StateTree;
use async_trait::async_trait;
use fxhash::FxHashMap;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use weave_domain::fassets::Fassets;
use weave_domain::intent::Intent;

/// Error returned by an effect rule.
///
/// Rule failures never reach the reducer or other rules; the dispatcher logs
/// them and publishes an [`EffectFailure`](crate::EffectFailure).
#[weave_derive::weave_error]
pub enum EffectError {
    /// The rule refused or could not complete its work.
    #[error("Effect rejected{}: {message}", format_context(context))]
    Rejected { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A capability the rule depends on is not available.
    #[error("Missing capability{}: {key}", format_context(context))]
    MissingCapability { key: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// What a running rule can see: the resolved capabilities and the current state.
#[derive(Debug, Clone)]
pub struct EffectContext {
    fassets: Fassets,
    state: watch::Receiver<Arc<StateTree>>,
    depth: usize,
}

impl EffectContext {
    pub(crate) const fn new(
        fassets: Fassets,
        state: watch::Receiver<Arc<StateTree>>,
        depth: usize,
    ) -> Self {
        Self { fassets, state, depth }
    }

    #[must_use]
    pub const fn fassets(&self) -> &Fassets {
        &self.fassets
    }

    /// Latest state snapshot. Reflects intents reduced after this rule started.
    #[must_use]
    pub fn state(&self) -> Arc<StateTree> {
        self.state.borrow().clone()
    }

    /// Position of the triggering intent in its causal chain (0 for host dispatches).
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

/// An asynchronous side effect triggered by one intent type.
///
/// Rules run after the reducer has applied the triggering intent, each on its
/// own task. Intents returned from [`EffectRule::run`] are dispatched in order.
#[async_trait]
pub trait EffectRule: Send + Sync + fmt::Debug {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Intent type that triggers the rule.
    fn match_type(&self) -> &str;

    async fn run(&self, ctx: EffectContext, intent: Arc<Intent>)
    -> Result<Vec<Intent>, EffectError>;
}

/// Closure-backed [`EffectRule`], built with [`rule`].
pub struct FnRule<F> {
    name: Cow<'static, str>,
    match_type: Cow<'static, str>,
    run: F,
}

impl<F> fmt::Debug for FnRule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule")
            .field("name", &self.name)
            .field("match_type", &self.match_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> EffectRule for FnRule<F>
where
    F: Fn(EffectContext, Arc<Intent>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Intent>, EffectError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn match_type(&self) -> &str {
        &self.match_type
    }

    async fn run(
        &self,
        ctx: EffectContext,
        intent: Arc<Intent>,
    ) -> Result<Vec<Intent>, EffectError> {
        (self.run)(ctx, intent).await
    }
}

/// Builds an effect rule from an async closure.
///
/// # Examples
/// ```rust
/// use weave_store::effect::rule;
/// use weave_domain::intent::Intent;
///
/// let announce = rule("announce-view", "view.change", |_ctx, intent| async move {
///     Ok(vec![Intent::new("view.changed", intent.payload().clone())])
/// });
/// assert_eq!(announce.match_type(), "view.change");
/// ```
pub fn rule<F, Fut>(
    name: impl Into<Cow<'static, str>>,
    match_type: impl Into<Cow<'static, str>>,
    run: F,
) -> Arc<dyn EffectRule>
where
    F: Fn(EffectContext, Arc<Intent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Intent>, EffectError>> + Send + 'static,
{
    Arc::new(FnRule { name: name.into(), match_type: match_type.into(), run })
}

/// All effect rules of a composition, indexed by intent type.
///
/// Rules matching the same type keep their registration order.
#[derive(Debug, Clone, Default)]
pub struct EffectSet {
    rules: Vec<(String, Arc<dyn EffectRule>)>,
    by_type: FxHashMap<String, Vec<usize>>,
}

impl EffectSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `rule` on behalf of feature `owner`.
    pub fn push(&mut self, owner: impl Into<String>, rule: Arc<dyn EffectRule>) {
        let index = self.rules.len();
        self.by_type.entry(rule.match_type().to_owned()).or_default().push(index);
        self.rules.push((owner.into(), rule));
    }

    /// Rules triggered by `kind`, with the feature that registered each.
    pub fn matching<'a>(
        &'a self,
        kind: &str,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<dyn EffectRule>)> + 'a {
        self.by_type
            .get(kind)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.rules.get(i))
            .map(|(owner, rule)| (owner.as_str(), rule))
    }

    /// Rule names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(_, rule)| rule.name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_are_indexed_by_type_in_registration_order() {
        let mut set = EffectSet::new();
        set.push("a", rule("first", "view.change", |_, _| async { Ok(Vec::new()) }));
        set.push("b", rule("other", "theme.set", |_, _| async { Ok(Vec::new()) }));
        set.push("c", rule("second", "view.change", |_, _| async { Ok(Vec::new()) }));

        let matched: Vec<(&str, &str)> =
            set.matching("view.change").map(|(owner, r)| (owner, r.name())).collect();
        assert_eq!(matched, vec![("a", "first"), ("c", "second")]);
        assert_eq!(set.matching("nothing").count(), 0);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["first", "other", "second"]);
    }

    #[test]
    fn effect_error_converts_from_strings() {
        let err = EffectError::from("boom");
        assert!(matches!(err, EffectError::Internal { .. }));
        assert!(err.to_string().contains("boom"));
    }
}
