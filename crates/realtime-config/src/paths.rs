//! File system paths for the realtime tooling.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Manages file system paths under `~/.quant-dashboard`.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.quant-dashboard`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".quant-dashboard"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.quant-dashboard/realtime.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("realtime.json")
    }

    /// Get the logs directory (~/.quant-dashboard/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file used by the CLI (~/.quant-dashboard/logs/realtime.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("realtime.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-quant");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("realtime.json"));
        assert_eq!(paths.logs_dir(), base.join("logs"));
        assert_eq!(paths.log_file(), base.join("logs/realtime.jsonl"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".quant-dashboard"));
    }

    #[test]
    fn test_ensure_dirs_idempotent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("quant");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
