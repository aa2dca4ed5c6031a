use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Top-level settings shared by the composer, the store and the host.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeaveConfigInner {
    pub compose: ComposeConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

/// Thin Arc-wrapped config for inexpensive cloning into subsystems.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct WeaveConfig {
    #[serde(flatten, default)]
    inner: Arc<WeaveConfigInner>,
}

impl Deref for WeaveConfig {
    type Target = WeaveConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for WeaveConfig {
    fn deref_mut(&mut self) -> &mut WeaveConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

/// Composition settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// External feature flags: `false` disables a feature, `true` force-enables it.
    pub flags: BTreeMap<String, bool>,
    /// Upper bound for a single `on_start` hook.
    pub hook_timeout_ms: u64,
}

impl ComposeConfig {
    /// Flag override for a feature, if one is configured.
    #[must_use]
    pub fn flag(&self, feature: &str) -> Option<bool> {
        self.flags.get(feature).copied()
    }

    #[must_use]
    pub const fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

/// Intent dispatch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum length of an intent chain (original intent has depth 0).
    /// `None` disables the limit.
    pub max_chain_depth: Option<usize>,
    /// Drop emitted intents whose type already appears in their causal chain.
    pub detect_cycles: bool,
    /// Buffer of the intent observer channel.
    pub intent_capacity: usize,
    /// Buffer of the effect failure channel.
    pub failure_capacity: usize,
}

/// Host logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub filter: Option<String>,
    pub directory: Option<PathBuf>,
    pub json: bool,
}

// --- Default ---

impl Default for ComposeConfig {
    fn default() -> Self {
        Self { flags: BTreeMap::new(), hook_timeout_ms: 5_000 }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: Some(32),
            detect_cycles: false,
            intent_capacity: 128,
            failure_capacity: 128,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), filter: None, directory: None, json: false }
    }
}
