//! QR Locator
//!
//! Finds and decodes the QR code on a rectified label and reports it in the
//! coordinate space of the image it was given, even when decoding ran on a
//! rescaled copy. Supports two decoding backends:
//! - General-purpose barcode reader (rxing)
//! - Grid detector with super-resolution retry (rqrr + optional ONNX model)

pub mod general;
pub mod neural;
pub mod payload;
pub mod preprocess;

pub use general::GeneralBarcodeBackend;
pub use neural::NeuralQrBackend;
pub use payload::{OrderFields, QrPayload};
pub use preprocess::{prepare_for_decoding, PreparedQrImage};

use anyhow::Result;
use image::{DynamicImage, GrayImage};
use std::time::Instant;
use tracing::{debug, info};

use super::geometry::order_points;
use crate::config::{QrBackendKind, QrSettings};

/// Raw decoder output in the coordinates of the image it was given
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedQr {
    /// Decoded text
    pub text: String,
    /// Corners, any order
    pub corners: [(f32, f32); 4],
    /// Decoder confidence
    pub confidence: f32,
}

/// A QR decoding backend
pub trait QrDecoder: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Decode the first QR code in `image`, `Ok(None)` if there is none
    fn decode(&self, image: &GrayImage) -> Result<Option<DecodedQr>>;
}

/// Build the decoding backend selected in the settings
pub fn build_decoder(settings: &QrSettings) -> Box<dyn QrDecoder> {
    match settings.backend {
        QrBackendKind::General => Box::new(GeneralBarcodeBackend::new(
            settings.try_rotate,
            settings.try_downscale,
        )),
        QrBackendKind::Neural => Box::new(NeuralQrBackend::new(
            settings.super_resolution_model.clone(),
            settings.super_resolution_max_side,
        )),
    }
}

/// QR locator: preprocessing, decoding, parsing and coordinate mapping
pub struct QrLocator {
    settings: QrSettings,
    decoder: Box<dyn QrDecoder>,
}

impl QrLocator {
    /// Create a locator with the backend named in the settings
    pub fn new(settings: QrSettings) -> Self {
        let decoder = build_decoder(&settings);
        Self { settings, decoder }
    }

    /// Create a locator with a specific decoder
    pub fn with_decoder(settings: QrSettings, decoder: Box<dyn QrDecoder>) -> Self {
        Self { settings, decoder }
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Decode and parse the QR code in `image`
    ///
    /// The returned polygon is always in `image` coordinates. `Ok(None)`
    /// means no QR code was found; `Err` is reserved for backend faults.
    pub fn detect(&self, image: &DynamicImage) -> Result<Option<QrPayload>> {
        let start = Instant::now();
        let gray = image.to_luma8();
        let prepared = prepare_for_decoding(&gray, &self.settings.preprocessing);

        let Some(decoded) = self.decoder.decode(&prepared.image)? else {
            debug!(
                "No QR code found by {} backend in {:?}",
                self.decoder.name(),
                start.elapsed()
            );
            return Ok(None);
        };

        let polygon = order_points(&decoded.corners).map(|(x, y)| (x as i32, y as i32));
        let payload = QrPayload::new(decoded.text, polygon, decoded.confidence);
        let payload = if prepared.scale_factor != 1.0 {
            payload.scale_back_coordinates(prepared.scale_factor)
        } else {
            payload
        };

        info!(
            "QR decoded by {} backend in {:?}: {:?} (position {})",
            self.decoder.name(),
            start.elapsed(),
            payload.raw_text,
            payload.position()
        );
        Ok(Some(payload))
    }
}

/// Complete a parallelogram from three finder-pattern centers
///
/// Input order is bottom-left, top-left, top-right (ZXing convention).
/// Used when a reader reports the finder patterns instead of the outer corners.
pub(crate) fn corners_from_finders(bottom_left: (f32, f32), top_left: (f32, f32), top_right: (f32, f32)) -> [(f32, f32); 4] {
    let bottom_right = (
        top_right.0 + bottom_left.0 - top_left.0,
        top_right.1 + bottom_left.1 - top_left.1,
    );
    [top_left, top_right, bottom_right, bottom_left]
}

/// Map a point found in a 90° clockwise rotated copy back to the source image
///
/// `src_height` is the height of the unrotated image.
pub(crate) fn unrotate_cw90(point: (f32, f32), src_height: u32) -> (f32, f32) {
    (point.1, src_height as f32 - 1.0 - point.0)
}

/// Render `text` as a QR code with `module` pixel modules at `origin`
///
/// Returns the image and the symbol's outer corners TL, TR, BR, BL.
#[cfg(test)]
pub(crate) fn render_qr(
    text: &str,
    module: u32,
    origin: (u32, u32),
    canvas: (u32, u32),
) -> (GrayImage, [(f32, f32); 4]) {
    use image::Luma;

    let code = qrcode::QrCode::new(text.as_bytes()).expect("payload fits in a QR code");
    let modules = code.width() as u32;
    let mut image = GrayImage::from_pixel(canvas.0, canvas.1, Luma([255]));
    for my in 0..modules {
        for mx in 0..modules {
            if code[(mx as usize, my as usize)] != qrcode::Color::Dark {
                continue;
            }
            for dy in 0..module {
                for dx in 0..module {
                    let x = origin.0 + mx * module + dx;
                    let y = origin.1 + my * module + dy;
                    image.put_pixel(x, y, Luma([0]));
                }
            }
        }
    }

    let (x0, y0) = (origin.0 as f32, origin.1 as f32);
    let side = (modules * module) as f32;
    (
        image,
        [(x0, y0), (x0 + side, y0), (x0 + side, y0 + side), (x0, y0 + side)],
    )
}

/// Where `corners` of an image `src_height` tall land after a clockwise turn
#[cfg(test)]
pub(crate) fn rotated_cw90_corners(corners: &[(f32, f32); 4], src_height: u32) -> [(f32, f32); 4] {
    corners.map(|(x, y)| (src_height as f32 - y, x))
}

/// Every expected corner has a found corner within `tolerance` on both axes
#[cfg(test)]
pub(crate) fn assert_corners_near(found: &[(f32, f32); 4], expected: &[(f32, f32); 4], tolerance: f32) {
    for e in expected {
        let nearest = found
            .iter()
            .map(|f| (f.0 - e.0).abs().max((f.1 - e.1).abs()))
            .fold(f32::INFINITY, f32::min);
        assert!(
            nearest <= tolerance,
            "corner {:?} not matched within {} by {:?}",
            e,
            tolerance,
            found
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QrPreprocessing;

    #[test]
    fn test_locates_rendered_code_in_source_coordinates() {
        // 320 px wide input is scaled to 480 before decoding
        let (image, bounds) = render_qr("110125-VA-M-000002-2", 8, (40, 16), (320, 240));
        let locator = QrLocator::new(QrSettings::default());
        let payload = locator
            .detect(&DynamicImage::ImageLuma8(image))
            .unwrap()
            .expect("rendered code is located");

        assert_eq!(payload.raw_text, "110125-VA-M-000002-2");
        assert_eq!(payload.position(), 2);
        let polygon = payload.polygon.map(|(x, y)| (x as f32, y as f32));
        assert_corners_near(&polygon, &bounds, 8.0);
    }

    /// Decoder that reports a fixed code
    struct FixedDecoder {
        text: &'static str,
        corners: [(f32, f32); 4],
    }

    impl QrDecoder for FixedDecoder {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn decode(&self, _image: &GrayImage) -> Result<Option<DecodedQr>> {
            Ok(Some(DecodedQr {
                text: self.text.to_string(),
                corners: self.corners,
                confidence: 1.0,
            }))
        }
    }

    struct EmptyDecoder;

    impl QrDecoder for EmptyDecoder {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn decode(&self, _image: &GrayImage) -> Result<Option<DecodedQr>> {
            Ok(None)
        }
    }

    #[test]
    fn test_coordinates_mapped_back_after_scaling() {
        // 240 px wide input, scaled 2x to 480 for decoding
        let decoder = FixedDecoder {
            text: "110125-VA-M-000002-2",
            corners: [(200.0, 40.0), (300.0, 40.0), (300.0, 140.0), (200.0, 140.0)],
        };
        let locator = QrLocator::with_decoder(QrSettings::default(), Box::new(decoder));

        let image = DynamicImage::ImageLuma8(GrayImage::new(240, 120));
        let payload = locator.detect(&image).unwrap().unwrap();

        assert_eq!(payload.polygon, [(100, 20), (150, 20), (150, 70), (100, 70)]);
        assert_eq!(payload.bounding_rect, (100, 20, 50, 50));
        assert_eq!(payload.position(), 2);
    }

    #[test]
    fn test_coordinates_unchanged_without_preprocessing() {
        let decoder = FixedDecoder {
            text: "not-structured",
            corners: [(30.0, 80.0), (10.0, 10.0), (80.0, 10.0), (90.0, 85.0)],
        };
        let settings = QrSettings {
            preprocessing: QrPreprocessing {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let locator = QrLocator::with_decoder(settings, Box::new(decoder));

        let payload = locator
            .detect(&DynamicImage::ImageLuma8(GrayImage::new(240, 120)))
            .unwrap()
            .unwrap();
        // Reordered to TL, TR, BR, BL
        assert_eq!(payload.polygon, [(10, 10), (80, 10), (90, 85), (30, 80)]);
        assert_eq!(payload.position(), 0);
        assert_eq!(payload.raw_text, "not-structured");
    }

    #[test]
    fn test_no_qr_returns_none() {
        let locator = QrLocator::with_decoder(QrSettings::default(), Box::new(EmptyDecoder));
        let image = DynamicImage::ImageLuma8(GrayImage::new(64, 64));
        assert!(locator.detect(&image).unwrap().is_none());
    }

    #[test]
    fn test_factory_selects_backend() {
        let general = QrLocator::new(QrSettings::default());
        assert_eq!(general.backend_name(), "general");

        let neural = QrLocator::new(QrSettings {
            backend: QrBackendKind::Neural,
            ..Default::default()
        });
        assert_eq!(neural.backend_name(), "neural");
    }

    #[test]
    fn test_corners_from_finders() {
        let corners = corners_from_finders((10.0, 90.0), (10.0, 10.0), (90.0, 10.0));
        assert_eq!(corners[2], (90.0, 90.0));
    }

    #[test]
    fn test_unrotate_cw90() {
        // 100x50 image; pixel (0, 0) lands at (49, 0) after a clockwise turn
        assert_eq!(unrotate_cw90((49.0, 0.0), 50), (0.0, 0.0));
        assert_eq!(unrotate_cw90((0.0, 99.0), 50), (99.0, 49.0));
    }
}
