use serial_test::serial;
use std::path::Path;
use weave_kernel::config::load_config;
use weave_kernel::domain::config::WeaveConfig;

/// Runs `f` with the working directory set to `dir`, restoring it afterwards.
fn within<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir).unwrap();
    let result = f();
    std::env::set_current_dir(previous).unwrap();
    result
}

#[test]
#[serial]
fn test_default_file_is_picked_up_from_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("weave.toml"),
        "[dispatch]\nmax_chain_depth = 4\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let cfg: WeaveConfig = within(dir.path(), || load_config(None::<&str>)).unwrap();
    assert_eq!(cfg.dispatch.max_chain_depth, Some(4));
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.compose.hook_timeout_ms, 5_000);
}

#[test]
#[serial]
fn test_missing_default_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();

    let cfg: WeaveConfig = within(dir.path(), || load_config(None::<&str>)).unwrap();
    assert_eq!(cfg.dispatch.max_chain_depth, Some(32));
    assert!(!cfg.dispatch.detect_cycles);
    assert!(cfg.compose.flags.is_empty());
}
