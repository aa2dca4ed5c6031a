use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

#[weave_derive::weave_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Loads layered settings: an optional file, then `WEAVE__` environment overrides.
///
/// 1. **File**: `path` if given (must exist), otherwise `weave.{toml,yaml,json}`
///    in the working directory when present.
/// 2. **Environment**: variables prefixed with `WEAVE__`, nested with double
///    underscores. `WEAVE__DISPATCH__MAX_CHAIN_DEPTH=8` maps to
///    `dispatch.max_chain_depth`.
///
/// # Errors
/// Returns [`ConfigError::Config`] if an explicit file is missing or the merged
/// sources do not match `T`.
///
/// # Example
/// ```rust
/// use weave_kernel::config::load_config;
/// use weave_domain::config::WeaveConfig;
///
/// let cfg: WeaveConfig = load_config(None::<&str>).unwrap_or_default();
/// assert_eq!(cfg.compose.hook_timeout_ms, 5_000);
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let (effective_path, required) = path
        .map_or_else(|| (PathBuf::from("weave"), false), |p| (p.as_ref().to_path_buf(), true));

    info!(path = %effective_path.display(), required, "Loading config");

    Config::builder()
        .add_source(File::from(effective_path.as_path()).required(required))
        .add_source(Environment::with_prefix("WEAVE").separator("__").try_parsing(true))
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use weave_domain::config::WeaveConfig;

    #[test]
    fn explicit_file_is_loaded_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[compose]\nhook_timeout_ms = 250\n\n[compose.flags]\ntheme = false\n\n[dispatch]\ndetect_cycles = true"
        )
        .unwrap();

        let cfg: WeaveConfig = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.compose.hook_timeout_ms, 250);
        assert_eq!(cfg.compose.flag("theme"), Some(false));
        assert!(cfg.dispatch.detect_cycles);
        assert_eq!(cfg.dispatch.max_chain_depth, Some(32));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config::<WeaveConfig>(Some(dir.path().join("absent.toml")))
            .expect_err("explicit file must exist");
        assert!(err.to_string().contains("Failed to build config"));
    }

    #[test]
    fn malformed_values_fail_deserialization() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[compose]\nhook_timeout_ms = \"soon\"").unwrap();

        let err = load_config::<WeaveConfig>(Some(file.path())).expect_err("bad type");
        assert!(matches!(err, ConfigError::Config { .. }));
    }
}
