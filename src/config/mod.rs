//! Client configuration for `ksr`.
//!
//! Preferences live in `config.kdl`, located at:
//! - `$KSR_CONFIG_DIR/config.kdl` when the variable is set
//! - `~/.config/keystone-resolver/config.kdl` otherwise
//!
//! Precedence: CLI flag > config file > defaults. Use the [`resolver`]
//! module for resolution with source tracking.

pub mod resolver;
pub mod schema;

use std::path::{Path, PathBuf};

use kdl::KdlDocument;

use crate::{Error, Result};

pub use resolver::{
    ConfigOverrides, DEFAULT_TIMEOUT_SECS, Resolved, ResolvedConfig, ValueSource, merge_config,
    resolve_config,
};
pub use schema::{ClientConfig, OutputFormat};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "KSR_CONFIG_DIR";

/// Config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// Resolve the config directory: explicit path, then `KSR_CONFIG_DIR`, then
/// the platform config dir.
pub fn config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::config_dir()
        .map(|d| d.join("keystone-resolver"))
        .ok_or_else(|| Error::InvalidInput("Could not determine config directory".to_string()))
}

/// Path to config.kdl under `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Read and validate config.kdl. A missing file yields an empty config.
pub fn read_config(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let doc: KdlDocument = content.parse().map_err(|e| Error::Parse {
        path: path.display().to_string(),
        message: format!("{}", e),
    })?;

    let config = ClientConfig::from_kdl(&doc);
    config.validate().map_err(|message| Error::Parse {
        path: path.display().to_string(),
        message,
    })?;
    Ok(config)
}

/// Write config.kdl, creating the directory if needed.
pub fn write_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut doc = config.to_kdl();
    doc.autoformat();
    std::fs::write(path, doc.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_config_dir_precedence() {
        let explicit = PathBuf::from("/tmp/explicit");
        assert_eq!(config_dir(Some(&explicit)).unwrap(), explicit);

        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var(CONFIG_DIR_ENV, "/tmp/from-env") };
        assert_eq!(config_dir(None).unwrap(), PathBuf::from("/tmp/from-env"));
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
    }

    #[test]
    fn test_read_missing_config_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = read_config(&config_path(dir.path())).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_write_then_read_config() {
        let dir = TempDir::new().unwrap();
        let path = config_path(&dir.path().join("nested"));
        let config = ClientConfig {
            timeout_secs: Some(12),
            default_instance: Some("cloud2".to_string()),
            ..Default::default()
        };

        write_config(&path, &config).unwrap();
        assert_eq!(read_config(&path).unwrap(), config);
    }

    #[test]
    fn test_read_invalid_kdl_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = config_path(dir.path());
        std::fs::write(&path, "timeout-secs \"unterminated").unwrap();

        let err = read_config(&path).unwrap_err();
        assert!(err.to_string().contains("config.kdl"));
    }
}
