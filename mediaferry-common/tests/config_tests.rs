//! Tests for root folder resolution and bootstrap configuration
//!
//! Tests that manipulate MEDIAFERRY_ROOT_FOLDER or MEDIAFERRY_ROOT are
//! marked #[serial] so they never race on the process environment.

use mediaferry_common::config::{
    CompiledDefaults, LoggingConfig, RootFolderInitializer, RootFolderResolver, TomlConfig,
    ROOT_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

fn clear_env() {
    env::remove_var(ROOT_FOLDER_ENV);
    env::remove_var(ROOT_ENV);
}

// =============================================================================
// Compiled defaults
// =============================================================================

#[test]
fn test_compiled_defaults() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.to_string_lossy().contains("mediaferry"));
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.bind_address, "127.0.0.1");
    assert_eq!(defaults.port, 8080);
}

// =============================================================================
// Resolution priority
// =============================================================================

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    clear_env();

    let root_folder = RootFolderResolver::new("nonexistent-test-module-12345").resolve();

    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var_root_folder() {
    clear_env();
    env::set_var(ROOT_FOLDER_ENV, "/tmp/mediaferry-test-env-folder");

    let root_folder = RootFolderResolver::new("test-module").resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/mediaferry-test-env-folder"));

    clear_env();
}

#[test]
#[serial]
fn test_resolver_root_folder_env_takes_precedence() {
    clear_env();
    env::set_var(ROOT_FOLDER_ENV, "/tmp/mediaferry-priority-1");
    env::set_var(ROOT_ENV, "/tmp/mediaferry-priority-2");

    let root_folder = RootFolderResolver::new("test-module").resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/mediaferry-priority-1"));

    clear_env();
}

#[test]
#[serial]
fn test_resolver_cli_arg_beats_env() {
    clear_env();
    env::set_var(ROOT_FOLDER_ENV, "/tmp/mediaferry-from-env");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/mediaferry-from-cli")))
        .resolve();
    assert_eq!(root_folder, PathBuf::from("/tmp/mediaferry-from-cli"));

    clear_env();
}

#[test]
fn test_config_file_path_uses_module_name() {
    let resolver = RootFolderResolver::new("backend");
    if let Some(path) = resolver.config_file_path() {
        assert!(path.ends_with("mediaferry/backend.toml"));
    }
}

// =============================================================================
// Root folder initialization
// =============================================================================

#[test]
fn test_initializer_paths() {
    let root = PathBuf::from("/tmp/mediaferry-test-root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("mediaferry.db"));
    assert_eq!(initializer.settings_path(), root.join("settings.json"));
}

#[test]
fn test_initializer_creates_nested_directory_idempotently() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("level1").join("level2");
    let initializer = RootFolderInitializer::new(root.clone());

    assert!(initializer.ensure_directory_exists().is_ok());
    assert!(initializer.ensure_directory_exists().is_ok());
    assert!(root.is_dir());
    assert!(!initializer.database_exists());
}

#[test]
fn test_initializer_rejects_file_as_root() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("not-a-dir");
    std::fs::write(&file, "x").unwrap();

    let initializer = RootFolderInitializer::new(file);
    assert!(initializer.ensure_directory_exists().is_err());
}

// =============================================================================
// TOML parsing
// =============================================================================

#[test]
fn test_toml_roundtrip() {
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/mediaferry")),
        logging: LoggingConfig::default(),
        bind_address: Some("0.0.0.0".to_string()),
        port: Some(9090),
    };

    let toml_str = toml::to_string(&config).unwrap();
    let parsed: TomlConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let toml_str = r#"
        root_folder = "/srv/mediaferry"
    "#;

    let config: TomlConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/mediaferry")));
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.port, None);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [").unwrap();

    let err = TomlConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}
