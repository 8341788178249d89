//! Image preprocessing for ONNX models
//!
//! Handles resizing, normalization, and tensor conversion for the orientation
//! classifier and the super-resolution model.

use image::{imageops::FilterType, GrayImage, RgbImage};
use ndarray::{Array3, Array4};

/// Preprocessing configuration for classification models
#[derive(Debug, Clone)]
pub struct ClassifierPreprocess {
    /// Shorter side is resized to this before cropping
    pub resize_short: u32,
    /// Side of the square center crop fed to the model
    pub crop_size: u32,
    /// Mean values for normalization [R, G, B]
    pub mean: [f32; 3],
    /// Std values for normalization [R, G, B]
    pub std: [f32; 3],
}

impl Default for ClassifierPreprocess {
    fn default() -> Self {
        Self {
            resize_short: 256,
            crop_size: 224,
            // ImageNet statistics, as used by PP-LCNet orientation models
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

/// Convert an RGB image to an HWC f32 array in [0, 1]
pub fn rgb_to_f32(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut rgb = Array3::<f32>::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            rgb[[y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }

    rgb
}

/// Normalize image with mean and std
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let mut normalized = Array3::<f32>::zeros((h, w, 3));

    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                normalized[[y, x, c]] = (image[[y, x, c]] - mean[c]) / std[c];
            }
        }
    }

    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Resize so the shorter side equals `short`, then center-crop a `crop` square
pub fn resize_short_and_center_crop(image: &RgbImage, short: u32, crop: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = short as f32 / w.min(h).max(1) as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(crop);
    let new_h = ((h as f32 * scale).round() as u32).max(crop);

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let x = (new_w - crop) / 2;
    let y = (new_h - crop) / 2;
    image::imageops::crop_imm(&resized, x, y, crop, crop).to_image()
}

/// Full preprocessing pipeline for classification
pub fn preprocess_for_classification(image: &RgbImage, config: &ClassifierPreprocess) -> Array4<f32> {
    // 1. Resize and crop to the model's square input
    let cropped = resize_short_and_center_crop(image, config.resize_short, config.crop_size);

    // 2. Convert to f32 and normalize
    let normalized = normalize(&rgb_to_f32(&cropped), &config.mean, &config.std);

    // 3. Convert to NCHW tensor
    hwc_to_nchw(&normalized)
}

/// Grayscale image to a [1, 1, H, W] tensor in [0, 1]
pub fn gray_to_nchw(image: &GrayImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    Array4::from_shape_fn((1, 1, height as usize, width as usize), |(_, _, y, x)| {
        image.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
    })
}

/// [1, 1, H, W] tensor data in [0, 1] back to a grayscale image
pub fn nchw_to_gray(data: &[f32], width: u32, height: u32) -> Option<GrayImage> {
    if data.len() < (width * height) as usize {
        return None;
    }
    Some(GrayImage::from_fn(width, height, |x, y| {
        let v = data[(y * width + x) as usize];
        image::Luma([(v * 255.0).round().clamp(0.0, 255.0) as u8])
    }))
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}
