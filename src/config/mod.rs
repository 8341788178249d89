//! Application Configuration
//!
//! Pipeline settings stored in TOML format. Every section falls back to its
//! defaults when omitted, so a partial file only needs the keys it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detector output filtering
    pub detection: DetectionSettings,
    /// Crop, deskew and orientation settings
    pub rectifier: RectifierSettings,
    /// Brightness/sharpness pass
    pub enhancement: EnhancementSettings,
    /// QR decoding settings
    pub qr: QrSettings,
    /// Text region carving around the QR anchor
    pub regions: RegionSettings,
    /// OCR input settings
    pub ocr: OcrSettings,
    /// Text reconciliation settings
    pub reconciliation: ReconciliationSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Detector output filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum detection confidence accepted by the pipeline
    pub confidence_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
        }
    }
}

/// Rectification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifierSettings {
    /// Rotate portrait crops 90° clockwise
    pub force_landscape: bool,
    /// Run the orientation classifier to undo upside-down labels
    pub ai_orientation_fix: bool,
    /// Minimum classifier score before a 180° rotation is applied
    pub ai_confidence_threshold: f32,
    /// Images wider than this are downscaled before classification
    pub ai_max_width: u32,
    /// ONNX orientation model (disabled when unset)
    pub orientation_model: Option<PathBuf>,
}

impl Default for RectifierSettings {
    fn default() -> Self {
        Self {
            force_landscape: true,
            ai_orientation_fix: true,
            ai_confidence_threshold: 0.6,
            ai_max_width: 1000,
            orientation_model: None,
        }
    }
}

/// Brightness/sharpness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementSettings {
    /// Master switch, the stage is a pass-through when false
    pub enabled: bool,
    /// Histogram equalization on the grayscale image
    pub brightness: bool,
    /// Unsharp mask
    pub sharpness: bool,
    /// Gaussian sigma of the unsharp mask
    pub sharpness_sigma: f32,
    /// Weight of the detail layer added back by the unsharp mask
    pub sharpness_amount: f32,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            brightness: true,
            sharpness: true,
            sharpness_sigma: 1.0,
            sharpness_amount: 1.5,
        }
    }
}

/// QR decoding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrBackendKind {
    /// General-purpose multi-format barcode reader
    #[default]
    General,
    /// Grid detector with super-resolution retry for small codes
    Neural,
}

/// QR preprocessing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrPreprocessMode {
    /// Scale to target width only
    Minimal,
    /// Scale, then median denoise
    #[default]
    Full,
}

/// QR decoding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrSettings {
    /// Decoding backend
    pub backend: QrBackendKind,
    /// Retry on a 90° rotated copy when nothing is found
    pub try_rotate: bool,
    /// Retry on a half-resolution copy when nothing is found
    pub try_downscale: bool,
    /// ONNX super-resolution model for the neural backend
    pub super_resolution_model: Option<PathBuf>,
    /// Images whose longest side is at most this get a super-resolution retry
    pub super_resolution_max_side: u32,
    /// Image preparation before decoding
    pub preprocessing: QrPreprocessing,
}

impl Default for QrSettings {
    fn default() -> Self {
        Self {
            backend: QrBackendKind::General,
            try_rotate: true,
            try_downscale: true,
            super_resolution_model: None,
            super_resolution_max_side: 400,
            preprocessing: QrPreprocessing::default(),
        }
    }
}

/// Image preparation applied before QR decoding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrPreprocessing {
    /// Enable preprocessing (the image is decoded as-is otherwise)
    pub enabled: bool,
    /// Scale only, or scale and denoise
    pub mode: QrPreprocessMode,
    /// Width the image is scaled to before decoding
    pub target_width: u32,
    /// Otsu binarization (off by default, it tends to break module edges)
    pub binarize: bool,
    /// Morphological close (off by default)
    pub morph_close: bool,
    /// Invert intensities (off by default)
    pub invert: bool,
}

impl Default for QrPreprocessing {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: QrPreprocessMode::Full,
            target_width: 480,
            binarize: false,
            morph_close: false,
            invert: false,
        }
    }
}

/// Region-of-interest ratios relative to the rectified image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Width of the above-QR window as a fraction of image width
    pub above_width_ratio: f32,
    /// Height of the above-QR window as a fraction of image height
    pub above_height_ratio: f32,
    /// Width of the below-QR window as a fraction of image width
    pub below_width_ratio: f32,
    /// Height of the below-QR window as a fraction of image height
    pub below_height_ratio: f32,
    /// Gap in pixels between the QR bottom edge and the below-QR window
    pub padding: u32,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            above_width_ratio: 0.35,
            above_height_ratio: 0.20,
            below_width_ratio: 0.65,
            below_height_ratio: 0.45,
            padding: 5,
        }
    }
}

/// OCR input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Merged regions smaller than this (either side) are upscaled 2x-4x
    pub min_dimension: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self { min_dimension: 80 }
    }
}

/// Text reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationSettings {
    /// Minimum combined similarity for a fuzzy catalog match
    pub min_fuzzy_score: f64,
    /// JSON array of products keyed by `Code`
    pub products_path: Option<PathBuf>,
    /// JSON array of sizes keyed by `name`
    pub sizes_path: Option<PathBuf>,
    /// JSON array of colors keyed by `name`
    pub colors_path: Option<PathBuf>,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            min_fuzzy_score: 0.90,
            products_path: None,
            sizes_path: None,
            colors_path: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Load configuration from an explicit path, or from the platform config
/// directory, falling back to defaults
pub fn load_or_default(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = crate::storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring unreadable configuration {:?}: {:#}", config_path, e),
            }
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// [`load_or_default`] with its log events written to `writer`
///
/// Used before the configured subscriber exists, at the level named by
/// `RUST_LOG` or info.
pub fn load_or_default_logged<W>(explicit: Option<&Path>, writer: W) -> Result<AppConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let bootstrap = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(bootstrap, || load_or_default(explicit))
}
