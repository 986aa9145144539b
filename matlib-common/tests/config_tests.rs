//! Configuration loading and path resolution
//!
//! Tests touching MATLIB_* environment variables are marked `#[serial]` so
//! they never race each other.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serial_test::serial;

use matlib_common::config::{
    get_default_root_folder, resolve_root_folder, TomlConfig, CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};
use matlib_common::Error;

#[test]
fn test_load_reads_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        database_path = "/srv/matlib/library.db"
        host = "0.0.0.0"
        port = 8080
        page_size = 50
        cache_ttl_secs = 60
        max_tree_depth = 8

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(
        config.database_path,
        Some(PathBuf::from("/srv/matlib/library.db"))
    );
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 8080);
    assert_eq!(config.page_size, 50);
    assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
    assert_eq!(config.max_tree_depth, 8);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    assert!(matches!(TomlConfig::load(&path), Err(Error::Config(_))));
    assert!(matches!(
        TomlConfig::load_or_default(Some(&path)),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_missing_explicit_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = TomlConfig::load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.port, 5780);
    assert_eq!(config.page_size, 25);
}

#[test]
#[serial]
fn test_config_file_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env.toml");
    std::fs::write(&path, "port = 9001").unwrap();

    env::set_var(CONFIG_FILE_ENV, &path);
    let config = TomlConfig::load_or_default(None);
    env::remove_var(CONFIG_FILE_ENV);

    assert_eq!(config.unwrap().port, 9001);
}

#[test]
#[serial]
fn test_root_folder_priority() {
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    assert_eq!(
        resolve_root_folder(Some(Path::new("/from/cli")), &config),
        PathBuf::from("/from/cli")
    );
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/from/env")
    );

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/from/toml")
    );
    assert_eq!(
        resolve_root_folder(None, &TomlConfig::default()),
        get_default_root_folder()
    );
}

#[test]
#[serial]
fn test_empty_root_folder_env_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "");
    let resolved = resolve_root_folder(None, &TomlConfig::default());
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(resolved, get_default_root_folder());
}
