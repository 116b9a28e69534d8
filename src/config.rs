//! Engine configuration
//!
//! Everything here has a working default; a host application can override the
//! content policy and storage locations through a small JSON file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Static configuration for the wallpaper engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whitelist patterns for the URL validator (empty = allow all).
    pub whitelist: Vec<String>,
    /// Blacklist patterns; these always win.
    pub blacklist: Vec<String>,
    /// WebView2 persistent profile folder. Defaults to
    /// `%APPDATA%\WebpaperEngine`.
    pub user_data_dir: Option<PathBuf>,
    /// Seconds between forced content reloads (crude cache clearing).
    pub cache_clear_interval_secs: u64,
    /// How many times the shell split signal is sent during discovery.
    pub shell_signal_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            user_data_dir: None,
            cache_clear_interval_secs: 30 * 60,
            shell_signal_attempts: 3,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Absent keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))
    }

    pub fn cache_clear_interval(&self) -> Duration {
        Duration::from_secs(self.cache_clear_interval_secs)
    }

    /// Resolve the WebView2 profile folder, creating the default under the
    /// user's application-data directory when none is configured.
    pub fn resolve_user_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.user_data_dir {
            return dir.clone();
        }
        let base = std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("WebpaperEngine")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.whitelist.is_empty());
        assert!(config.blacklist.is_empty());
        assert_eq!(config.cache_clear_interval(), Duration::from_secs(1800));
        assert_eq!(config.shell_signal_attempts, 3);
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"blacklist":["https://evil.com*"],"cache_clear_interval_secs":60}}"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.blacklist, vec!["https://evil.com*".to_string()]);
        assert_eq!(config.cache_clear_interval(), Duration::from_secs(60));
        // Untouched keys keep defaults.
        assert!(config.whitelist.is_empty());
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(EngineConfig::load(file.path()).is_err());
    }
}
