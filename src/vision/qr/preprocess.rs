//! Image preparation before QR decoding
//!
//! Scales the image to a fixed working width and optionally denoises it.
//! The scale factor is returned with the image: decoded coordinates must be
//! mapped back with it before they are used on the original image.

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::close;
use tracing::debug;

use crate::config::{QrPreprocessMode, QrPreprocessing};

/// Scale factors this close to 1.0 are treated as no scaling
const SCALE_TOLERANCE: f32 = 0.01;

/// Image ready for decoding
#[derive(Debug, Clone)]
pub struct PreparedQrImage {
    /// Image handed to the decoder
    pub image: GrayImage,
    /// prepared width / original width
    pub scale_factor: f32,
}

/// Scale and filter `image` according to `settings`
pub fn prepare_for_decoding(image: &GrayImage, settings: &QrPreprocessing) -> PreparedQrImage {
    if !settings.enabled {
        return PreparedQrImage {
            image: image.clone(),
            scale_factor: 1.0,
        };
    }

    let (mut prepared, scale_factor) = scale_to_width(image, settings.target_width);

    if settings.mode == QrPreprocessMode::Full {
        prepared = denoise(&prepared);
    }

    // Available but off by default: each tends to damage module edges
    if settings.binarize {
        prepared = binarize(&prepared);
    }
    if settings.morph_close {
        prepared = morph_close(&prepared);
    }
    if settings.invert {
        imageops::invert(&mut prepared);
    }

    debug!(
        "QR preprocessing ({:?}): {}x{} -> {}x{} (scale {:.3})",
        settings.mode,
        image.width(),
        image.height(),
        prepared.width(),
        prepared.height(),
        scale_factor
    );

    PreparedQrImage {
        image: prepared,
        scale_factor,
    }
}

/// Resize to `target_width` keeping the aspect ratio
///
/// The factor is computed from the actual input width on every call.
/// Returns the image and `target_width / width`, or 1.0 when no resize
/// was needed.
pub fn scale_to_width(image: &GrayImage, target_width: u32) -> (GrayImage, f32) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || target_width == 0 {
        return (image.clone(), 1.0);
    }

    let scale = target_width as f32 / w as f32;
    if (scale - 1.0).abs() < SCALE_TOLERANCE {
        return (image.clone(), 1.0);
    }

    let new_h = ((h as f32 * scale) as u32).max(1);
    // Bicubic when enlarging, box-like triangle filter when shrinking
    let filter = if scale > 1.0 {
        FilterType::CatmullRom
    } else {
        FilterType::Triangle
    };
    (imageops::resize(image, target_width, new_h, filter), scale)
}

/// 3x3 median blur
pub fn denoise(image: &GrayImage) -> GrayImage {
    median_filter(image, 1, 1)
}

/// Global Otsu threshold
pub fn binarize(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    threshold(image, level, ThresholdType::Binary)
}

/// Morphological close with a 3x3 square element
pub fn morph_close(image: &GrayImage) -> GrayImage {
    close(image, Norm::LInf, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn settings(mode: QrPreprocessMode) -> QrPreprocessing {
        QrPreprocessing {
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_scale_factor_follows_input_width() {
        let (small, f1) = scale_to_width(&GrayImage::new(240, 100), 480);
        assert!((f1 - 2.0).abs() < 1e-6);
        assert_eq!(small.dimensions(), (480, 200));

        let (large, f2) = scale_to_width(&GrayImage::new(960, 300), 480);
        assert!((f2 - 0.5).abs() < 1e-6);
        assert_eq!(large.dimensions(), (480, 150));
    }

    #[test]
    fn test_near_unit_scale_is_skipped() {
        let (same, f) = scale_to_width(&GrayImage::new(483, 200), 480);
        assert_eq!(f, 1.0);
        assert_eq!(same.dimensions(), (483, 200));
    }

    #[test]
    fn test_disabled_preprocessing_is_identity() {
        let image = GrayImage::from_fn(50, 20, |x, _| Luma([x as u8]));
        let prepared = prepare_for_decoding(
            &image,
            &QrPreprocessing {
                enabled: false,
                ..Default::default()
            },
        );
        assert_eq!(prepared.scale_factor, 1.0);
        assert_eq!(prepared.image, image);
    }

    #[test]
    fn test_full_mode_removes_salt_noise() {
        let mut image = GrayImage::from_pixel(480, 40, Luma([0]));
        image.put_pixel(100, 20, Luma([255]));

        let minimal = prepare_for_decoding(&image, &settings(QrPreprocessMode::Minimal));
        assert_eq!(minimal.image.get_pixel(100, 20)[0], 255);

        let full = prepare_for_decoding(&image, &settings(QrPreprocessMode::Full));
        assert_eq!(full.image.get_pixel(100, 20)[0], 0);
    }

    #[test]
    fn test_optional_filters() {
        let image = GrayImage::from_fn(480, 10, |x, _| Luma([if x < 240 { 30 } else { 220 }]));
        let prepared = prepare_for_decoding(
            &image,
            &QrPreprocessing {
                mode: QrPreprocessMode::Minimal,
                binarize: true,
                invert: true,
                ..Default::default()
            },
        );
        assert_eq!(prepared.image.get_pixel(0, 0)[0], 255);
        assert_eq!(prepared.image.get_pixel(479, 0)[0], 0);
    }
}
