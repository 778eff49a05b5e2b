/// Application configuration
///
/// The configuration is loaded once at startup from `config.json`
/// and written back every time a setting changes. Keys this version
/// does not know about are carried through untouched.
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Output backend used by the export commands
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Pdf,
    Docx,
}

impl ExportFormat {
    /// Output name used when none is given; the content is JSON
    pub fn default_file_name(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "mistake-book.pdf.json",
            ExportFormat::Docx => "mistake-book.docx.json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "docx" | "word" => Ok(ExportFormat::Docx),
            other => Err(format!("unknown export format '{other}' (expected pdf or docx)")),
        }
    }
}

/// Last crop rectangle, in percent of the image size
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSettings {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            right: 100,
            bottom: 100,
        }
    }
}

/// All recognized settings
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Subject chosen for the most recent import
    pub last_subject: String,
    pub ocr_enabled: bool,
    /// JPEG quality used when writing processed images (1-100)
    pub image_quality: u8,
    pub export_format: ExportFormat,
    pub theme: String,
    /// Copy an image to `<file>.backup` before the first in-place edit
    pub auto_backup: bool,
    pub show_stats: bool,
    /// Last rotation angle in degrees
    pub image_rotation: i32,
    pub crop_settings: CropSettings,

    /// Unknown keys, preserved on save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_subject: "Chinese".to_string(),
            ocr_enabled: true,
            image_quality: 90,
            export_format: ExportFormat::Pdf,
            theme: "default".to_string(),
            auto_backup: true,
            show_stats: true,
            image_rotation: 0,
            crop_settings: CropSettings::default(),
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Convert to pretty JSON for `config.json`
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from a JSON object; see [`Config::from_map`]
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self::from_map(map))
    }

    /// Read each recognized key on its own.
    ///
    /// A missing key, or one whose value has the wrong type, takes its
    /// default; `image_quality` is clamped to 1-100. Every other key is kept
    /// in `extra`.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let defaults = Config::default();
        Self {
            last_subject: take(&mut map, "last_subject", defaults.last_subject),
            ocr_enabled: take(&mut map, "ocr_enabled", defaults.ocr_enabled),
            image_quality: take_quality(&mut map, defaults.image_quality),
            export_format: take(&mut map, "export_format", defaults.export_format),
            theme: take(&mut map, "theme", defaults.theme),
            auto_backup: take(&mut map, "auto_backup", defaults.auto_backup),
            show_stats: take(&mut map, "show_stats", defaults.show_stats),
            image_rotation: take(&mut map, "image_rotation", defaults.image_rotation),
            crop_settings: take(&mut map, "crop_settings", defaults.crop_settings),
            extra: map,
        }
    }
}

fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str, default: T) -> T {
    let Some(value) = map.remove(key) else {
        return default;
    };
    match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(key, error = %e, "⚠️  Invalid config value, using default");
            default
        }
    }
}

fn take_quality(map: &mut Map<String, Value>, default: u8) -> u8 {
    let Some(value) = map.remove("image_quality") else {
        return default;
    };
    match value.as_f64() {
        Some(quality) if quality.is_finite() => quality.round().clamp(1.0, 100.0) as u8,
        _ => {
            tracing::warn!(value = %value, "⚠️  Invalid image_quality, using default");
            default
        }
    }
}

/// Owns the in-memory configuration and its file
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
    /// The file on disk could not be used; it is set aside before the first save
    unusable: bool,
}

impl ConfigStore {
    /// Load `path`, falling back to defaults when it is missing or unreadable.
    ///
    /// A file that exists but is not a JSON object is never overwritten: the
    /// first save copies it to `config.json.invalid`.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (config, unusable) = match fs::read_to_string(&path) {
            Ok(text) => match Config::from_json(&text) {
                Ok(config) => (config, false),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "⚠️  Invalid config, using defaults");
                    (Config::default(), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Config::default(), false),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "⚠️  Could not read config, using defaults");
                (Config::default(), true)
            }
        };

        tracing::debug!(path = %path.display(), "config loaded");
        Self {
            path,
            config,
            unusable,
        }
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current configuration to disk
    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("save config", parent, e))?;
        }
        if self.unusable && self.path.exists() {
            let kept = self.path.with_extension("json.invalid");
            fs::copy(&self.path, &kept).map_err(|e| Error::io("save config", &kept, e))?;
            tracing::warn!(kept = %kept.display(), "⚠️  Previous config set aside");
        }
        self.unusable = false;
        let json = self
            .config
            .to_json()
            .map_err(|e| Error::json("save config", &self.path, e))?;
        fs::write(&self.path, json).map_err(|e| Error::io("save config", &self.path, e))
    }

    fn update(&mut self, apply: impl FnOnce(&mut Config)) -> Result<()> {
        apply(&mut self.config);
        self.save()
    }

    pub fn set_last_subject(&mut self, subject: &str) -> Result<()> {
        self.update(|c| c.last_subject = subject.to_string())
    }

    pub fn set_ocr_enabled(&mut self, enabled: bool) -> Result<()> {
        self.update(|c| c.ocr_enabled = enabled)
    }

    /// Quality is clamped to 1-100
    pub fn set_image_quality(&mut self, quality: u32) -> Result<()> {
        let quality = quality.clamp(1, 100) as u8;
        self.update(|c| c.image_quality = quality)
    }

    pub fn set_export_format(&mut self, format: ExportFormat) -> Result<()> {
        self.update(|c| c.export_format = format)
    }

    pub fn set_theme(&mut self, theme: &str) -> Result<()> {
        self.update(|c| c.theme = theme.to_string())
    }

    pub fn set_auto_backup(&mut self, enabled: bool) -> Result<()> {
        self.update(|c| c.auto_backup = enabled)
    }

    pub fn set_show_stats(&mut self, enabled: bool) -> Result<()> {
        self.update(|c| c.show_stats = enabled)
    }

    pub fn set_image_rotation(&mut self, degrees: i32) -> Result<()> {
        self.update(|c| c.image_rotation = degrees)
    }

    pub fn set_crop_settings(&mut self, settings: CropSettings) -> Result<()> {
        self.update(|c| c.crop_settings = settings)
    }

    /// Set a recognized key from its textual value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| Error::Unsupported(format!("invalid value '{value}' for '{key}'")))
        }

        match key {
            "last_subject" => self.set_last_subject(value),
            "ocr_enabled" => self.set_ocr_enabled(parse(key, value)?),
            "image_quality" => self.set_image_quality(parse(key, value)?),
            "export_format" => self.set_export_format(
                value.parse().map_err(Error::Unsupported)?,
            ),
            "theme" => self.set_theme(value),
            "auto_backup" => self.set_auto_backup(parse(key, value)?),
            "show_stats" => self.set_show_stats(parse(key, value)?),
            "image_rotation" => self.set_image_rotation(parse(key, value)?),
            other => Err(Error::Unsupported(format!("unknown setting '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_keys_are_backfilled() {
        let config = Config::from_json(r#"{"theme": "dark"}"#).unwrap();
        assert_eq!(config.theme, "dark");
        assert_eq!(config.image_quality, 90);
        assert!(config.ocr_enabled);
        assert_eq!(config.export_format, ExportFormat::Pdf);
    }

    #[test]
    fn test_unknown_keys_survive_a_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"window_geometry": "1400x900", "theme": "dark"}"#).unwrap();

        let mut store = ConfigStore::load(&path);
        store.set_auto_backup(false).unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["window_geometry"], "1400x900");
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["auto_backup"], false);
    }

    #[test]
    fn test_every_setter_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut store = ConfigStore::load(&path);
        store.set_last_subject("Math").unwrap();

        let reloaded = ConfigStore::load(&path);
        assert_eq!(reloaded.get().last_subject, "Math");
    }

    #[test]
    fn test_quality_is_clamped() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::load(dir.path().join("config.json"));

        store.set_image_quality(0).unwrap();
        assert_eq!(store.get().image_quality, 1);
        store.set_image_quality(250).unwrap();
        assert_eq!(store.get().image_quality, 100);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let store = ConfigStore::load(&path);
        assert_eq!(store.get(), &Config::default());
    }

    #[test]
    fn test_default_export_names_say_json() {
        assert_eq!(ExportFormat::Pdf.default_file_name(), "mistake-book.pdf.json");
        assert_eq!("word".parse::<ExportFormat>().unwrap().default_file_name(), "mistake-book.docx.json");
    }

    #[test]
    fn test_set_by_key() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::load(dir.path().join("config.json"));

        store.set("export_format", "docx").unwrap();
        store.set("ocr_enabled", "false").unwrap();
        assert_eq!(store.get().export_format, ExportFormat::Docx);
        assert!(!store.get().ocr_enabled);

        assert!(store.set("nope", "1").is_err());
        assert!(store.set("image_quality", "high").is_err());
    }

    #[test]
    fn test_one_bad_value_keeps_the_rest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"window_geometry": "1400x900", "theme": "dark", "image_quality": 300, "ocr_enabled": "yes"}"#,
        )
        .unwrap();

        let mut store = ConfigStore::load(&path);
        assert_eq!(store.get().theme, "dark");
        assert_eq!(store.get().image_quality, 100);
        assert!(store.get().ocr_enabled);

        store.set_last_subject("Math").unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["window_geometry"], "1400x900");
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["image_quality"], 100);
        assert_eq!(saved["last_subject"], "Math");
    }

    #[test]
    fn test_loaded_quality_is_clamped() {
        assert_eq!(Config::from_json(r#"{"image_quality": 0}"#).unwrap().image_quality, 1);
        assert_eq!(Config::from_json(r#"{"image_quality": -5}"#).unwrap().image_quality, 1);
        assert_eq!(Config::from_json(r#"{"image_quality": 75}"#).unwrap().image_quality, 75);
        assert_eq!(Config::from_json(r#"{"image_quality": "high"}"#).unwrap().image_quality, 90);
    }

    #[test]
    fn test_unparseable_file_is_set_aside_before_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let mut store = ConfigStore::load(&path);
        store.set_theme("dark").unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("config.json.invalid")).unwrap(), "{not json");
        assert_eq!(ConfigStore::load(&path).get().theme, "dark");
    }
}
