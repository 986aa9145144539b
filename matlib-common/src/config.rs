//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Values resolve in this
//! priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "MATLIB_ROOT_FOLDER";

/// Environment variable pointing at the TOML config file
pub const CONFIG_FILE_ENV: &str = "MATLIB_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "matlib.db";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to SQLite database file; defaults to `<root_folder>/matlib.db`
    pub database_path: Option<PathBuf>,

    /// Folder holding the database when no explicit path is given
    pub root_folder: Option<PathBuf>,

    /// HTTP bind address
    pub host: String,

    /// HTTP server port
    pub port: u16,

    /// Rows per page for paged listings
    pub page_size: i64,

    /// Lifetime of cached tag subtrees in seconds (0 = until invalidated)
    pub cache_ttl_secs: u64,

    /// Depth cap applied while materializing tag trees
    pub max_tree_depth: usize,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            root_folder: None,
            host: "127.0.0.1".to_string(),
            port: 5780,
            page_size: 25,
            cache_ttl_secs: 115_200, // 32 hours
            max_tree_depth: 64,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded TOML configuration from {:?}", path);
        Ok(config)
    }

    /// Load the config file if one can be found, otherwise fall back to defaults
    ///
    /// A missing file is not fatal. A file that exists but does not parse is.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
            .or_else(default_config_path);

        match path {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                warn!("Config file {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            None => {
                warn!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.page_size < 1 {
            return Err(Error::Config(format!(
                "page_size must be positive, got {}",
                self.page_size
            )));
        }
        if self.max_tree_depth == 0 {
            return Err(Error::Config("max_tree_depth must be positive".to_string()));
        }
        Ok(())
    }

    /// Cache entry lifetime, `None` when entries live until invalidated
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

/// Resolve the root folder: CLI > environment > TOML > OS default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Resolve the database file: CLI > TOML `database_path` > `<root>/matlib.db`
pub fn resolve_database_path(
    cli_arg: Option<&Path>,
    root_folder: &Path,
    config: &TomlConfig,
) -> PathBuf {
    cli_arg
        .map(Path::to_path_buf)
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
}

/// Get default configuration file path for the platform
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("matlib").join("config.toml"));

    if cfg!(target_os = "linux") {
        // Try ~/.config/matlib/config.toml first, then /etc/matlib/config.toml
        if let Some(path) = &user_config {
            if path.exists() {
                return user_config;
            }
        }
        Some(PathBuf::from("/etc/matlib/config.toml"))
    } else {
        user_config
    }
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/matlib (or /var/lib/matlib for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("matlib"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/matlib"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/matlib
        dirs::data_dir()
            .map(|d| d.join("matlib"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/matlib"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\matlib
        dirs::data_local_dir()
            .map(|d| d.join("matlib"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\matlib"))
    } else {
        PathBuf::from("./matlib_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5780);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(115_200)));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 8080
            cache_ttl_secs = 0

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.cache_ttl(), None);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let result = TomlConfig::from_toml_str("page_size = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_database_path_priority() {
        let root = PathBuf::from("/srv/matlib");
        let mut config = TomlConfig::default();

        assert_eq!(
            resolve_database_path(None, &root, &config),
            root.join(DATABASE_FILE_NAME)
        );

        config.database_path = Some(PathBuf::from("/data/toml.db"));
        assert_eq!(
            resolve_database_path(None, &root, &config),
            PathBuf::from("/data/toml.db")
        );

        let cli = PathBuf::from("/tmp/cli.db");
        assert_eq!(resolve_database_path(Some(&cli), &root, &config), cli);
    }
}
