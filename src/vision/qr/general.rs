//! General-purpose barcode reader backend (rxing)

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::GrayImage;
use rxing::BarcodeFormat;
use tracing::debug;

use super::{corners_from_finders, unrotate_cw90, DecodedQr, QrDecoder};

/// QR decoding through the rxing multi-format reader
pub struct GeneralBarcodeBackend {
    try_rotate: bool,
    try_downscale: bool,
}

impl GeneralBarcodeBackend {
    /// Create the backend with its retry options
    pub fn new(try_rotate: bool, try_downscale: bool) -> Self {
        Self {
            try_rotate,
            try_downscale,
        }
    }
}

impl QrDecoder for GeneralBarcodeBackend {
    fn name(&self) -> &'static str {
        "general"
    }

    fn decode(&self, image: &GrayImage) -> Result<Option<DecodedQr>> {
        if let Some(found) = decode_luma(image) {
            return Ok(Some(found));
        }

        if self.try_rotate {
            let rotated = imageops::rotate90(image);
            if let Some(found) = decode_luma(&rotated) {
                debug!("QR found on rotated copy");
                let height = image.height();
                return Ok(Some(DecodedQr {
                    corners: found.corners.map(|p| unrotate_cw90(p, height)),
                    ..found
                }));
            }
        }

        if self.try_downscale && image.width() >= 64 && image.height() >= 64 {
            let half = imageops::resize(
                image,
                image.width() / 2,
                image.height() / 2,
                FilterType::Triangle,
            );
            if let Some(found) = decode_luma(&half) {
                debug!("QR found on half-resolution copy");
                let sx = image.width() as f32 / half.width() as f32;
                let sy = image.height() as f32 / half.height() as f32;
                return Ok(Some(DecodedQr {
                    corners: found.corners.map(|(x, y)| (x * sx, y * sy)),
                    ..found
                }));
            }
        }

        Ok(None)
    }
}

/// Single decode attempt on a grayscale buffer
fn decode_luma(image: &GrayImage) -> Option<DecodedQr> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let result = match rxing::helpers::detect_in_luma(
        image.as_raw().clone(),
        width,
        height,
        Some(BarcodeFormat::QR_CODE),
    ) {
        Ok(result) => result,
        Err(e) => {
            debug!("rxing: {:?}", e);
            return None;
        }
    };

    let points: Vec<(f32, f32)> = result.getPoints().iter().map(|p| (p.x, p.y)).collect();
    let corners = match points.as_slice() {
        // Outer corners of the symbol, in no fixed order
        [a, b, c, d, ..] => [*a, *b, *c, *d],
        // Finder pattern centers only: bottom-left, top-left, top-right
        [bl, tl, tr] => corners_from_finders(*bl, *tl, *tr),
        _ => {
            let (w, h) = (width as f32 - 1.0, height as f32 - 1.0);
            [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
        }
    };

    Some(DecodedQr {
        text: result.getText().to_string(),
        corners,
        confidence: 1.0,
    })
}
