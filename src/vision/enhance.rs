//! Brightness and sharpness enhancement
//!
//! Optional pass between rectification and QR decoding. When enabled the
//! label is converted to grayscale, histogram-equalized and unsharp-masked.

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use crate::config::EnhancementSettings;

/// Brightness/sharpness enhancer
#[derive(Debug, Clone, Default)]
pub struct Enhancer {
    settings: EnhancementSettings,
}

impl Enhancer {
    /// Create an enhancer with the given settings
    pub fn new(settings: EnhancementSettings) -> Self {
        Self { settings }
    }

    /// Apply the configured filters
    ///
    /// Returns the input unchanged (as RGB) when disabled, grayscale otherwise.
    pub fn enhance(&self, image: &RgbImage) -> DynamicImage {
        if !self.settings.enabled {
            debug!("Enhancement disabled");
            return DynamicImage::ImageRgb8(image.clone());
        }

        debug!(
            "Enhancement enabled: brightness={}, sharpness={} (sigma={}, amount={})",
            self.settings.brightness,
            self.settings.sharpness,
            self.settings.sharpness_sigma,
            self.settings.sharpness_amount
        );

        let mut gray = DynamicImage::ImageRgb8(image.clone()).to_luma8();

        if self.settings.brightness {
            gray = equalize_histogram(&gray);
        }

        if self.settings.sharpness && self.settings.sharpness_amount > 0.0 {
            gray = unsharp_mask(&gray, self.settings.sharpness_sigma, self.settings.sharpness_amount);
        }

        DynamicImage::ImageLuma8(gray)
    }
}

/// `original * (1 + amount) - blurred * amount`, clamped to [0, 255]
pub fn unsharp_mask(image: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    let blurred = gaussian_blur_f32(image, sigma);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let original = image.get_pixel(x, y)[0] as f32;
        let smooth = blurred.get_pixel(x, y)[0] as f32;
        let value = original * (1.0 + amount) - smooth * amount;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_pass_through() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30]));
        let enhancer = Enhancer::new(EnhancementSettings {
            enabled: false,
            ..Default::default()
        });

        let out = enhancer.enhance(&image);
        assert_eq!(out.to_rgb8(), image);
    }

    #[test]
    fn test_enabled_produces_grayscale_same_size() {
        let image = RgbImage::from_fn(16, 8, |x, _| image::Rgb([(x * 10) as u8, 0, 0]));
        let out = Enhancer::new(EnhancementSettings::default()).enhance(&image);
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        assert_eq!((out.width(), out.height()), (16, 8));
    }

    #[test]
    fn test_unsharp_mask_flat_image_unchanged() {
        let flat = GrayImage::from_pixel(10, 10, Luma([120]));
        let out = unsharp_mask(&flat, 1.0, 1.5);
        assert!(out.pixels().all(|p| (p[0] as i32 - 120).abs() <= 1));
    }

    #[test]
    fn test_unsharp_mask_increases_edge_contrast() {
        let step = GrayImage::from_fn(20, 4, |x, _| Luma([if x < 10 { 80 } else { 160 }]));
        let out = unsharp_mask(&step, 1.0, 1.5);
        assert!(out.get_pixel(9, 2)[0] < 80);
        assert!(out.get_pixel(10, 2)[0] > 160);
    }
}
