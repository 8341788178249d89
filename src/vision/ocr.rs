//! OCR (Optical Character Recognition) interface
//!
//! The recognition network itself is an external collaborator. This module
//! defines what the pipeline consumes from it, the minimum-size upscaling
//! applied before recognition, and a replay engine that serves recorded
//! results.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Single recognized text block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Recognized text
    pub text: String,
    /// Recognition confidence
    pub confidence: f32,
    /// Bounding polygon points, first point top-left
    pub polygon: Vec<(f32, f32)>,
}

impl TextBlock {
    /// Create a block
    pub fn new(text: impl Into<String>, confidence: f32, polygon: Vec<(f32, f32)>) -> Self {
        Self {
            text: text.into(),
            confidence,
            polygon,
        }
    }

    /// y-coordinate of the first polygon point, used for reading order
    pub fn top(&self) -> f32 {
        self.polygon.first().map(|p| p.1).unwrap_or(0.0)
    }

    /// Map polygon coordinates from an upscaled image back by `1 / scale`
    pub fn unscaled(mut self, scale: u32) -> Self {
        if scale > 1 {
            let s = scale as f32;
            for p in &mut self.polygon {
                *p = (p.0 / s, p.1 / s);
            }
        }
        self
    }
}

/// Text recognition engine
pub trait TextRecognizer {
    /// Recognize all text in `image`; blocks are returned in no particular order
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<TextBlock>>;
}

/// Recognizer that returns a fixed set of blocks, e.g. recorded from a previous run
#[derive(Debug, Clone, Default)]
pub struct RecordedRecognizer {
    blocks: Vec<TextBlock>,
}

impl RecordedRecognizer {
    /// Serve `blocks` for every image
    pub fn new(blocks: Vec<TextBlock>) -> Self {
        Self { blocks }
    }

    /// Load blocks from a JSON array of `{text, confidence, polygon}`
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Ok(Self::new(load_text_blocks(path)?))
    }
}

impl TextRecognizer for RecordedRecognizer {
    fn recognize(&mut self, _image: &RgbImage) -> Result<Vec<TextBlock>> {
        Ok(self.blocks.clone())
    }
}

/// Load text blocks from a JSON file
pub fn load_text_blocks(path: &Path) -> Result<Vec<TextBlock>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read OCR blocks {:?}", path))?;
    let blocks: Vec<TextBlock> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse OCR blocks {:?}", path))?;
    Ok(blocks)
}

/// Integer upscale factor so both sides reach `min_dimension` (2x-4x, 1 if already large enough)
pub fn auto_upscale_factor(width: u32, height: u32, min_dimension: u32) -> u32 {
    if width == 0 || height == 0 || (width >= min_dimension && height >= min_dimension) {
        return 1;
    }
    let height_scale = (min_dimension as f32 / height as f32).ceil() as u32;
    let width_scale = (min_dimension as f32 / width as f32).ceil() as u32;
    height_scale.max(width_scale).clamp(2, 4)
}

/// Upscale small OCR inputs; returns the image and the factor applied
pub fn upscale_for_ocr(image: &RgbImage, min_dimension: u32) -> (RgbImage, u32) {
    let (width, height) = image.dimensions();
    let scale = auto_upscale_factor(width, height, min_dimension);
    if scale == 1 {
        return (image.clone(), 1);
    }

    info!("Auto-upscaling small region from {}x{} by {}x", width, height, scale);
    (
        imageops::resize(image, width * scale, height * scale, FilterType::Triangle),
        scale,
    )
}
