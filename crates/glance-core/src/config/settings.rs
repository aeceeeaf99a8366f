//! Application configuration loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::thumb::pipeline::{PipelineSettings, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_EDGE};

/// Top-level application configuration.
///
/// All fields have sensible defaults so glance works without a config file.
/// Call [`Config::load`] to read from a TOML path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::from_io(e, path))?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Thumbnail constraints derived from the `[preview]` table.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_edge: self.preview.max_edge.max(1),
            jpeg_quality: self.preview.jpeg_quality.clamp(1, 100),
        }
    }
}

/// General file-browsing preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub show_hidden: bool,
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_max_edge")]
    pub max_edge: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_edge: default_max_edge(),
            jpeg_quality: default_jpeg_quality(),
            use_cache: true,
        }
    }
}

/// Preview cache storage.
///
/// `path` falls back to the frontend's default location when unset.
/// With `persist = false` previews live only as long as the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            persist: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_edge() -> u32 {
    DEFAULT_MAX_EDGE
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = Config::default();

        assert!(!config.general.show_hidden);
        assert_eq!(config.preview.max_edge, 90);
        assert_eq!(config.preview.jpeg_quality, 75);
        assert!(config.preview.use_cache);
        assert!(config.cache.path.is_none());
        assert!(config.cache.persist);
    }

    #[test]
    fn load_full_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[general]
show_hidden = true

[preview]
max_edge = 128
jpeg_quality = 90
use_cache = false

[cache]
path = "/var/tmp/previews.json"
persist = false
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert!(config.general.show_hidden);
        assert_eq!(config.preview.max_edge, 128);
        assert_eq!(config.preview.jpeg_quality, 90);
        assert!(!config.preview.use_cache);
        assert_eq!(
            config.cache.path.as_deref(),
            Some(Path::new("/var/tmp/previews.json"))
        );
        assert!(!config.cache.persist);
    }

    #[test]
    fn load_partial_toml_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[preview]
max_edge = 64
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.preview.max_edge, 64);
        assert_eq!(config.preview.jpeg_quality, 75);
        assert!(config.preview.use_cache);
        assert!(config.cache.persist);
        assert!(!config.general.show_hidden);
    }

    #[test]
    fn load_empty_toml_uses_all_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.pipeline_settings(), PipelineSettings::default());
    }

    #[test]
    fn load_nonexistent_returns_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = Config::load(&tmp.path().join("nonexistent.toml"));
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
    }

    #[test]
    fn load_invalid_toml_returns_config_parse() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not valid [[[toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result.unwrap_err(), CoreError::ConfigParse(_)));
    }

    #[test]
    fn pipeline_settings_are_clamped() {
        let mut config = Config::default();
        config.preview.max_edge = 0;
        config.preview.jpeg_quality = 0;

        let settings = config.pipeline_settings();
        assert_eq!(settings.max_edge, 1);
        assert_eq!(settings.jpeg_quality, 1);
    }
}
