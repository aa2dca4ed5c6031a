use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use weave_domain::fassets::FassetValue;

type CheckFn = Arc<dyn Fn(&FassetValue) -> Option<String> + Send + Sync>;

/// A named check over a resolved value: `None` when it passes, otherwise a
/// description of the problem.
#[derive(Clone)]
pub struct Validator {
    name: Cow<'static, str>,
    check: CheckFn,
}

impl Validator {
    pub fn custom<F>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        F: Fn(&FassetValue) -> Option<String> + Send + Sync + 'static,
    {
        Self { name: name.into(), check: Arc::new(check) }
    }

    /// Requires the value to declare every listed operation.
    ///
    /// # Examples
    /// ```rust
    /// use weave_kernel::contracts::Validator;
    /// use weave_domain::fassets::FassetValue;
    ///
    /// let needs_log = Validator::operations(["log"]);
    /// let logger = FassetValue::new(()).with_operations(["log"]);
    /// assert!(needs_log.check(&logger).is_none());
    /// assert!(needs_log.check(&FassetValue::new(())).is_some());
    /// ```
    pub fn operations<I, S>(operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required: BTreeSet<String> = operations.into_iter().map(Into::into).collect();
        let name = format!("operations({})", required.iter().cloned().collect::<Vec<_>>().join(", "));

        Self::custom(name, move |value| {
            let missing: Vec<&str> =
                required.iter().map(String::as_str).filter(|op| !value.provides(op)).collect();
            (!missing.is_empty()).then(|| format!("needs {}", missing.join(", ")))
        })
    }

    /// Requires the value to be a `T`.
    pub fn of_type<T: Any>() -> Self {
        let expected = std::any::type_name::<T>();
        Self::custom(format!("of_type({expected})"), move |value| {
            (!value.is::<T>())
                .then(|| format!("expected {expected}, found {}", value.type_name()))
        })
    }

    /// Passes only if both validators pass; reports the first failure.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let name = format!("{} & {}", self.name, other.name);
        Self::custom(name, move |value| self.check(value).or_else(|| other.check(value)))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn check(&self, value: &FassetValue) -> Option<String> {
        (self.check)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.name).finish()
    }
}
