//! Command implementations.

pub mod config;
pub mod ingest;
pub mod serve;
pub mod sync;

use std::path::PathBuf;

use flowstash_core::{Config, ConfigError};

/// Expand `~` in a user-supplied config path.
pub fn config_path(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
}

/// Load config from `path`, or from the default location when `None`.
pub fn load_config(path: Option<&std::path::Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_expands_tilde() {
        let path = config_path(Some("~/flowstash.toml")).unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("flowstash.toml"));
        assert!(config_path(None).is_none());
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rate_limit]\nmax_requests = 3\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.rate_limit.max_requests, 3);
    }
}
