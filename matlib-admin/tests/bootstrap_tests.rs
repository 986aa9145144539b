//! Config loading before the service subscriber exists

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use matlib_admin::load_config;
use matlib_common::config::TomlConfig;

/// Test helper: log sink shared with the bootstrap subscriber
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_missing_config_file_is_logged() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let captured = Captured::default();
    let writer = captured.clone();

    let config = load_config(Some(&dir.path().join("absent.toml")), move || writer.clone())
        .expect("Missing file should fall back to defaults");

    assert_eq!(config.port, TomlConfig::default().port);
    let log = captured.text();
    assert!(log.contains("not found, using defaults"), "log: {}", log);
}

#[test]
fn test_loaded_config_file_is_logged() {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let path = dir.path().join("matlib.toml");
    std::fs::write(&path, "port = 6001\n").unwrap();
    let captured = Captured::default();
    let writer = captured.clone();

    let config = load_config(Some(&path), move || writer.clone()).expect("Should load config");

    assert_eq!(config.port, 6001);
    let log = captured.text();
    assert!(log.contains("Loaded TOML configuration"), "log: {}", log);
}
