//! Configuration management for FastConvert

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConvertError, Result};

pub mod options;
pub use options::*;

/// Persisted defaults for conversion runs.
///
/// The pipeline never reads this directly; it is turned into one immutable
/// [`ConversionOptions`] per run via [`Settings::to_options`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory scanned for source images
    pub source_dir: PathBuf,

    /// Directory receiving converted images
    pub target_dir: PathBuf,

    /// Requested worker count (<= 0 means "use the default")
    pub workers: i64,

    /// Lossy encoding quality (1-100)
    pub quality: i32,

    /// Skip files whose output already exists
    pub skip_existing: bool,

    /// Maximum output width in pixels (0 = unbounded)
    pub width: i32,

    /// Maximum output height in pixels (0 = unbounded)
    pub height: i32,

    /// Formats offered to interactive front ends
    pub formats: Vec<ImageFormat>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Worker count used when none is configured
pub const DEFAULT_WORKERS: usize = 2;

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./test/input"),
            target_dir: PathBuf::from("./test/output"),
            workers: DEFAULT_WORKERS as i64,
            quality: DEFAULT_QUALITY,
            skip_existing: false,
            width: 0,
            height: 0,
            formats: vec![
                ImageFormat::Jpeg,
                ImageFormat::Png,
                ImageFormat::Gif,
                ImageFormat::Bmp,
                ImageFormat::Tiff,
                ImageFormat::WebP,
            ],
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Image encodings known to the converter.
///
/// All of them can be recognised as input; only some can be produced, see
/// [`ImageFormat::is_supported_target`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    #[serde(rename = "jpg", alias = "jpeg")]
    Jpeg,
    #[serde(rename = "png")]
    Png,
    #[serde(rename = "gif")]
    Gif,
    #[serde(rename = "bmp")]
    Bmp,
    #[serde(rename = "tiff", alias = "tif")]
    Tiff,
    #[serde(rename = "webp")]
    WebP,
}

impl ImageFormat {
    /// Get file extension for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
        }
    }

    /// Every extension that denotes this format
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Jpeg => &["jpg", "jpeg"],
            Self::Tiff => &["tiff", "tif"],
            Self::Png => &["png"],
            Self::Gif => &["gif"],
            Self::Bmp => &["bmp"],
            Self::WebP => &["webp"],
        }
    }

    /// Parse a format tag such as `jpg` or `PNG`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tiff" | "tif" => Some(Self::Tiff),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Whether `path` carries one of this format's extensions
    pub fn matches_extension(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                self.aliases().iter().any(|alias| alias.eq_ignore_ascii_case(ext))
            })
    }

    /// Whether the converter can encode into this format
    pub fn is_supported_target(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Gif | Self::Bmp)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tag(s).ok_or_else(|| ConvertError::config(format!("Unknown format tag: {}", s)))
    }
}

impl Settings {
    /// Load settings from a `.toml` or `.yaml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ConvertError::config(format!(
                "Failed to read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let settings: Self = match config_extension(path.as_ref()).as_str() {
            "toml" => toml::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            _ => {
                return Err(ConvertError::config(
                    "Unsupported config file format. Use .toml or .yaml",
                ))
            }
        };

        settings.validate()?;
        info!("Loaded settings from {:?}", path.as_ref());
        Ok(settings)
    }

    /// Load settings if the file exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = match config_extension(path.as_ref()).as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| ConvertError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| ConvertError::config(format!("YAML serialization failed: {}", e)))?,
            _ => {
                return Err(ConvertError::config(
                    "Unsupported config file format. Use .toml or .yaml",
                ))
            }
        };

        std::fs::write(&path, content).map_err(|e| {
            ConvertError::config(format!(
                "Failed to write config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        Ok(())
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.formats.is_empty() {
            return Err(ConvertError::config("At least one format must be listed"));
        }
        if self.width < 0 || self.height < 0 {
            return Err(ConvertError::config(
                "Width and height must not be negative",
            ));
        }
        Ok(())
    }

    /// Worker count adjusted to the machine.
    ///
    /// A request above the CPU count is halved; a non-positive one falls back
    /// to [`DEFAULT_WORKERS`].
    pub fn effective_workers(&self, cpus: usize) -> usize {
        if self.workers <= 0 {
            return DEFAULT_WORKERS;
        }
        let requested = usize::try_from(self.workers).unwrap_or(usize::MAX);
        if requested > cpus {
            (requested / 2).max(1)
        } else {
            requested
        }
    }

    /// Build the immutable options for one run
    pub fn to_options(&self, source: SourceFormat, target: ImageFormat) -> ConversionOptions {
        ConversionOptions::new(&self.source_dir, &self.target_dir, target)
            .source_format(source)
            .max_dimensions(self.width, self.height)
            .workers(self.effective_workers(num_cpus::get()))
            .quality(self.quality)
            .skip_existing(self.skip_existing)
    }
}

fn config_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.quality, 80);
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.formats.len(), 6);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_file_io() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.quality = 65;
        settings.skip_existing = true;

        let toml_path = dir.path().join("config.toml");
        settings.to_file(&toml_path).unwrap();
        let loaded = Settings::from_file(&toml_path).unwrap();
        assert_eq!(loaded.quality, 65);
        assert!(loaded.skip_existing);

        let yaml_path = dir.path().join("config.yaml");
        settings.to_file(&yaml_path).unwrap();
        let loaded = Settings::from_file(&yaml_path).unwrap();
        assert_eq!(loaded.formats, settings.formats);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "source_dir: ./in\nformats: [jpeg, png]\n").unwrap();

        let loaded = Settings::from_file(&path).unwrap();
        assert_eq!(loaded.source_dir, PathBuf::from("./in"));
        assert_eq!(loaded.formats, vec![ImageFormat::Jpeg, ImageFormat::Png]);
        assert_eq!(loaded.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn test_unsupported_config_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        assert!(Settings::default().to_file(&path).is_err());
    }

    #[test]
    fn test_effective_workers() {
        let mut settings = Settings::default();

        settings.workers = 0;
        assert_eq!(settings.effective_workers(8), DEFAULT_WORKERS);

        settings.workers = -3;
        assert_eq!(settings.effective_workers(8), DEFAULT_WORKERS);

        settings.workers = 4;
        assert_eq!(settings.effective_workers(8), 4);

        settings.workers = 16;
        assert_eq!(settings.effective_workers(8), 8);
    }

    #[test]
    fn test_format_tags() {
        assert_eq!(ImageFormat::from_tag("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_tag("tif"), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::from_tag("raw"), None);
        assert!("xyz".parse::<ImageFormat>().is_err());
        assert_eq!(ImageFormat::Jpeg.to_string(), "jpg");
    }

    #[test]
    fn test_target_support() {
        assert!(ImageFormat::Jpeg.is_supported_target());
        assert!(ImageFormat::Bmp.is_supported_target());
        assert!(!ImageFormat::WebP.is_supported_target());
        assert!(!ImageFormat::Tiff.is_supported_target());
    }

    #[test]
    fn test_extension_matching() {
        assert!(ImageFormat::Jpeg.matches_extension(Path::new("a.JPEG")));
        assert!(ImageFormat::Jpeg.matches_extension(Path::new("a.jpg")));
        assert!(!ImageFormat::Png.matches_extension(Path::new("a.jpg")));
        assert!(!ImageFormat::Png.matches_extension(Path::new("png")));
    }
}
