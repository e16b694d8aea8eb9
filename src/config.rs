//! Gallery configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. User values are
//! layered on top of stock defaults, so a config file only needs the keys it
//! wants to change. A couple of secrets can also come from the environment.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [store]
//! url = ""                  # Record store base URL (https://<ref>.supabase.co)
//! anon_key = ""             # Public API key sent as `apikey` + bearer token
//!
//! [origin]
//! storage_url = ""          # Object storage base (https://<ref>.supabase.co/storage/v1)
//! cdn_url = ""              # CDN delivery base (https://res.cloudinary.com/<cloud>)
//!
//! [images]
//! thumb_width = 480
//! medium_width = 960
//! large_width = 1280
//! quality = 75
//! hero_width = 1920
//! hero_quality = 85
//! format = "webp"           # webp | avif | origin
//!
//! [window]
//! initial = 50              # Images realized on first render
//! increment = 50            # Images added per sentinel trigger
//! margin_px = 400           # Proximity margin ahead of the viewport
//!
//! [export]
//! concurrency = 4           # Parallel fetches during bulk export
//! timeout_secs = 30         # Per-image fetch timeout
//! output_dir = "."
//! ```
//!
//! ## Environment
//!
//! `EVENT_GALLERY_STORE_URL` and `EVENT_GALLERY_ANON_KEY` override
//! `store.url` and `store.anon_key` so keys can stay out of the file.
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILENAME: &str = "config.toml";

pub const ENV_STORE_URL: &str = "EVENT_GALLERY_STORE_URL";
pub const ENV_ANON_KEY: &str = "EVENT_GALLERY_ANON_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Gallery configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Record store connection.
    pub store: StoreConfig,
    /// Origin services that deliver image bytes.
    pub origin: OriginConfig,
    /// Width/quality presets for derived URLs.
    pub images: ImagesConfig,
    /// Progressive loading of the gallery grid.
    pub window: WindowConfig,
    /// Download and archive settings.
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub url: String,
    pub anon_key: String,
}

/// Origin bases. Left empty, records that need one fail to resolve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OriginConfig {
    /// Storage service base; render and object endpoints hang off it.
    pub storage_url: String,
    /// CDN base used for records that only carry a public id.
    pub cdn_url: String,
}

/// Output format requested from the render service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    #[default]
    Webp,
    Avif,
    /// No transformation: every variant points at the raw object.
    Origin,
}

impl RenderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFormat::Webp => "webp",
            RenderFormat::Avif => "avif",
            RenderFormat::Origin => "origin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub thumb_width: u32,
    pub medium_width: u32,
    pub large_width: u32,
    /// Quality for thumb/medium/large renders (1-100).
    pub quality: u32,
    pub hero_width: u32,
    /// Quality for hero and lightbox-scale renders (1-100).
    pub hero_quality: u32,
    pub format: RenderFormat,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            thumb_width: 480,
            medium_width: 960,
            large_width: 1280,
            quality: 75,
            hero_width: 1920,
            hero_quality: 85,
            format: RenderFormat::Webp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub initial: usize,
    pub increment: usize,
    pub margin_px: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial: 50,
            increment: 50,
            margin_px: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout_secs: 30,
            output_dir: ".".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GalleryConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let images = &self.images;
        for (key, quality) in [
            ("images.quality", images.quality),
            ("images.hero_quality", images.hero_quality),
        ] {
            if quality == 0 || quality > 100 {
                return Err(ConfigError::Validation(format!("{key} must be 1-100")));
            }
        }
        if images.thumb_width == 0 || images.hero_width == 0 {
            return Err(ConfigError::Validation(
                "image widths must be non-zero".into(),
            ));
        }
        if !(images.thumb_width < images.medium_width && images.medium_width < images.large_width)
        {
            return Err(ConfigError::Validation(
                "images widths must ascend: thumb < medium < large".into(),
            ));
        }
        if self.window.initial == 0 || self.window.increment == 0 {
            return Err(ConfigError::Validation(
                "window.initial and window.increment must be non-zero".into(),
            ));
        }
        if self.export.concurrency == 0 {
            return Err(ConfigError::Validation(
                "export.concurrency must be non-zero".into(),
            ));
        }
        if self.export.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "export.timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides for the store connection.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_STORE_URL).filter(|v| !v.is_empty()) {
            self.store.url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY).filter(|v| !v.is_empty()) {
            self.store.anon_key = key;
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(GalleryConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<GalleryConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: GalleryConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<GalleryConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    let mut config = resolve_config(overlay)?;
    config.apply_env_with(|key| std::env::var(key).ok());
    Ok(config)
}

/// Returns a fully-commented stock `config.toml`. Used by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Event Gallery Configuration
# ===========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Record store (PostgREST-compatible)
# ---------------------------------------------------------------------------
[store]
# Base URL, e.g. https://<project>.supabase.co
# Overridden by EVENT_GALLERY_STORE_URL.
url = ""

# Public (anon) API key. Overridden by EVENT_GALLERY_ANON_KEY.
anon_key = ""

# ---------------------------------------------------------------------------
# Origins
# ---------------------------------------------------------------------------
[origin]
# Object storage base, e.g. https://<project>.supabase.co/storage/v1
# Renders: {storage_url}/render/image/public/{bucket}/{path}?width=&quality=&format=
# Raw:     {storage_url}/object/public/{bucket}/{path}
storage_url = ""

# CDN base for records that only carry a public id,
# e.g. https://res.cloudinary.com/<cloud>
# Records with pre-computed URL sets need neither base.
cdn_url = ""

# ---------------------------------------------------------------------------
# Derived image URLs
# ---------------------------------------------------------------------------
[images]
thumb_width = 480
medium_width = 960
large_width = 1280

# Render quality for thumb/medium/large (1-100).
quality = 75

# Hero and lightbox-scale renders.
hero_width = 1920
hero_quality = 85

# Render format: "webp", "avif", or "origin" (no transformation).
format = "webp"

# ---------------------------------------------------------------------------
# Progressive loading
# ---------------------------------------------------------------------------
[window]
# Images realized on first render.
initial = 50

# Images added each time the sentinel nears the viewport.
increment = 50

# How far ahead of the visible area the sentinel counts as near.
margin_px = 400

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# Parallel fetches during a bulk export.
concurrency = 4

# Per-image fetch timeout in seconds. Expired fetches are skipped.
timeout_secs = 30

# Where downloads and archives are saved.
output_dir = "."
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_image_presets() {
        let config = GalleryConfig::default();
        assert_eq!(config.images.thumb_width, 480);
        assert_eq!(config.images.medium_width, 960);
        assert_eq!(config.images.large_width, 1280);
        assert_eq!(config.images.quality, 75);
        assert_eq!(config.images.hero_quality, 85);
        assert_eq!(config.images.format, RenderFormat::Webp);
    }

    #[test]
    fn default_config_has_window_and_export_settings() {
        let config = GalleryConfig::default();
        assert_eq!(config.window.initial, 50);
        assert_eq!(config.window.increment, 50);
        assert_eq!(config.window.margin_px, 400);
        assert_eq!(config.export.concurrency, 4);
        assert_eq!(config.export.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[window]
increment = 24
"#;
        let config: GalleryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.window.increment, 24);
        // Default values preserved
        assert_eq!(config.window.initial, 50);
        assert_eq!(config.images.thumb_width, 480);
    }

    #[test]
    fn parse_render_format() {
        let config: GalleryConfig = toml::from_str("[images]\nformat = \"origin\"\n").unwrap();
        assert_eq!(config.images.format, RenderFormat::Origin);
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = resolve_config(load_raw_config(&tmp.path().join(CONFIG_FILENAME)).unwrap())
            .unwrap();
        assert_eq!(config.export.concurrency, 4);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            r#"
[origin]
storage_url = "https://abc.supabase.co/storage/v1"

[export]
concurrency = 8
"#,
        )
        .unwrap();
        let config = resolve_config(load_raw_config(&path).unwrap()).unwrap();
        assert_eq!(config.origin.storage_url, "https://abc.supabase.co/storage/v1");
        assert_eq!(config.origin.cdn_url, "");
        assert_eq!(config.export.concurrency, 8);
        assert_eq!(config.export.timeout_secs, 30);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "[window\ninitial = ").unwrap();
        assert!(matches!(load_raw_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let overlay: toml::Value = toml::from_str("[window]\npage_size = 10\n").unwrap();
        assert!(resolve_config(Some(overlay)).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let overlay: toml::Value = toml::from_str("[colors]\nbg = \"#fff\"\n").unwrap();
        assert!(resolve_config(Some(overlay)).is_err());
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_nested_tables_keep_base_keys() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str("[images]\nquality = 60").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["images"]["quality"].as_integer(), Some(60));
        assert_eq!(merged["images"]["thumb_width"].as_integer(), Some(480));
        assert_eq!(merged["window"]["initial"].as_integer(), Some(50));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(GalleryConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = GalleryConfig::default();
        config.images.quality = 100;
        assert!(config.validate().is_ok());
        config.images.quality = 101;
        assert!(config.validate().is_err());
        config.images.quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_widths_must_ascend() {
        let mut config = GalleryConfig::default();
        config.images.medium_width = 2000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ascend"));
    }

    #[test]
    fn validate_zero_increment() {
        let mut config = GalleryConfig::default();
        config.window.increment = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zero_concurrency() {
        let mut config = GalleryConfig::default();
        config.export.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_store_connection() {
        let mut config = GalleryConfig::default();
        config.store.url = "https://from-file".into();
        config.apply_env_with(|key| match key {
            ENV_ANON_KEY => Some("secret".into()),
            ENV_STORE_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.store.anon_key, "secret");
        // Empty env values don't clobber the file
        assert_eq!(config.store.url, "https://from-file");
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: GalleryConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = GalleryConfig::default();
        assert_eq!(config.images.large_width, defaults.images.large_width);
        assert_eq!(config.window.margin_px, defaults.window.margin_px);
        assert_eq!(config.export.timeout_secs, defaults.export.timeout_secs);
        assert_eq!(config.origin.cdn_url, defaults.origin.cdn_url);
        assert!(config.validate().is_ok());
    }
}
