//! Region Extractor
//!
//! Carves the two text-bearing areas of a label relative to its QR code and
//! stacks them into one image so OCR runs once per label:
//! - above the QR, centred on its right edge (position/quantity)
//! - below the QR, left-aligned (product code, size, color)

use image::imageops;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, warn};

use super::geometry::PointI;
use crate::config::RegionSettings;

/// Fixed fallback window above the QR: height, and half-width around the right edge
const ABOVE_FALLBACK_HEIGHT: i64 = 40;
const ABOVE_FALLBACK_HALF_WIDTH: i64 = 60;
/// Fixed fallback gap below the QR
const BELOW_FALLBACK_GAP: i64 = 5;

/// Placeholder (width, height) for an empty above-QR crop
pub const ABOVE_PLACEHOLDER: (u32, u32) = (120, 40);
/// Placeholder (width, height) for an empty below-QR crop
pub const BELOW_PLACEHOLDER: (u32, u32) = (200, 100);

/// Rows of the separator bar between the two regions
pub const SEPARATOR_ROWS: u32 = 3;
const SEPARATOR_GRAY: u8 = 128;
const PAD_WHITE: u8 = 255;

/// Extracted text regions
#[derive(Debug, Clone)]
pub struct ComponentRegions {
    /// above, separator, below stacked vertically
    pub merged: RgbImage,
    /// Area above the QR
    pub above: RgbImage,
    /// Area below the QR
    pub below: RgbImage,
    /// QR polygon the regions were derived from
    pub qr_polygon: [PointI; 4],
    /// Above-QR crop was empty and replaced by a placeholder
    pub above_placeholder: bool,
    /// Below-QR crop was empty and replaced by a placeholder
    pub below_placeholder: bool,
}

impl ComponentRegions {
    /// Whether either region fell back to a placeholder
    pub fn is_degraded(&self) -> bool {
        self.above_placeholder || self.below_placeholder
    }
}

/// Aggregate position of the QR polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrAnchor {
    pub center: (i64, i64),
    pub top: i64,
    pub bottom: i64,
    pub right: i64,
}

impl QrAnchor {
    /// Summarize a 4-point polygon
    pub fn from_polygon(polygon: &[PointI; 4]) -> Self {
        let sum_x: i64 = polygon.iter().map(|p| p.0 as i64).sum();
        let sum_y: i64 = polygon.iter().map(|p| p.1 as i64).sum();
        Self {
            center: (sum_x.div_euclid(4), sum_y.div_euclid(4)),
            top: polygon.iter().map(|p| p.1 as i64).min().unwrap_or(0),
            bottom: polygon.iter().map(|p| p.1 as i64).max().unwrap_or(0),
            right: polygon.iter().map(|p| p.0 as i64).max().unwrap_or(0),
        }
    }
}

/// Half-open crop window in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
}

impl Window {
    fn is_degenerate(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    /// Clip to the image; `None` when nothing is left
    fn clip(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.clamp(0, width as i64);
        let x2 = self.x2.clamp(0, width as i64);
        let y1 = self.y1.clamp(0, height as i64);
        let y2 = self.y2.clamp(0, height as i64);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

/// Region extractor
#[derive(Debug, Clone, Default)]
pub struct RegionExtractor {
    settings: RegionSettings,
}

impl RegionExtractor {
    /// Create an extractor with the given ratios
    pub fn new(settings: RegionSettings) -> Self {
        Self { settings }
    }

    /// Extract both regions around `qr_polygon` and merge them
    ///
    /// Never fails: empty crops are replaced by black placeholders of fixed
    /// size and flagged on the result.
    pub fn extract_and_merge(&self, image: &DynamicImage, qr_polygon: &[PointI; 4]) -> ComponentRegions {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let anchor = QrAnchor::from_polygon(qr_polygon);

        let above_window = self.above_window(&anchor, width, height);
        let below_window = self.below_window(&anchor, width, height);

        let (above, above_placeholder) = crop_or_placeholder(&rgb, above_window, ABOVE_PLACEHOLDER);
        let (below, below_placeholder) = crop_or_placeholder(&rgb, below_window, BELOW_PLACEHOLDER);
        if above_placeholder {
            warn!("Above-QR region empty, using placeholder");
        }
        if below_placeholder {
            warn!("Below-QR region empty, using placeholder");
        }

        let merged = merge_regions(&above, &below);
        debug!(
            "Regions: above {}x{}, below {}x{}, merged {}x{}",
            above.width(),
            above.height(),
            below.width(),
            below.height(),
            merged.width(),
            merged.height()
        );

        ComponentRegions {
            merged,
            above,
            below,
            qr_polygon: *qr_polygon,
            above_placeholder,
            below_placeholder,
        }
    }

    fn above_window(&self, anchor: &QrAnchor, width: u32, height: u32) -> Window {
        let roi_h = (height as f32 * self.settings.above_height_ratio) as i64;
        let roi_w = (width as f32 * self.settings.above_width_ratio) as i64;

        let window = Window {
            x1: (anchor.right - roi_w / 2).max(0),
            y1: (anchor.top - roi_h).max(0),
            x2: (anchor.right + roi_w / 2).min(width as i64),
            y2: anchor.top,
        };
        if !window.is_degenerate() {
            return window;
        }

        debug!("Above-QR window degenerate, using fixed window");
        Window {
            x1: (anchor.right - ABOVE_FALLBACK_HALF_WIDTH).max(0),
            y1: (anchor.top - ABOVE_FALLBACK_HEIGHT).max(0),
            x2: (anchor.right + ABOVE_FALLBACK_HALF_WIDTH).min(width as i64),
            y2: anchor.top,
        }
    }

    fn below_window(&self, anchor: &QrAnchor, width: u32, height: u32) -> Window {
        let roi_h = (height as f32 * self.settings.below_height_ratio) as i64;
        let roi_w = (width as f32 * self.settings.below_width_ratio) as i64;

        let window = Window {
            x1: 0,
            y1: anchor.bottom + self.settings.padding as i64,
            x2: roi_w,
            y2: (anchor.bottom + roi_h).min(height as i64),
        };
        if !window.is_degenerate() {
            return window;
        }

        debug!("Below-QR window degenerate, using fixed window");
        Window {
            x1: 0,
            y1: (anchor.bottom + BELOW_FALLBACK_GAP).min(height as i64 - 1),
            x2: width as i64 / 2,
            y2: height as i64,
        }
    }
}

fn crop_or_placeholder(image: &RgbImage, window: Window, placeholder: (u32, u32)) -> (RgbImage, bool) {
    match window.clip(image.width(), image.height()) {
        Some((x, y, w, h)) => (imageops::crop_imm(image, x, y, w, h).to_image(), false),
        None => (RgbImage::new(placeholder.0, placeholder.1), true),
    }
}

/// Stack `above` (centred) over a gray bar over `below` (left-aligned)
pub fn merge_regions(above: &RgbImage, below: &RgbImage) -> RgbImage {
    let target_width = above.width().max(below.width());
    let total_height = above.height() + SEPARATOR_ROWS + below.height();

    let mut merged = RgbImage::from_pixel(target_width, total_height, Rgb([PAD_WHITE; 3]));

    let above_left = (target_width - above.width()) / 2;
    imageops::replace(&mut merged, above, above_left as i64, 0);

    for y in above.height()..above.height() + SEPARATOR_ROWS {
        for x in 0..target_width {
            merged.put_pixel(x, y, Rgb([SEPARATOR_GRAY; 3]));
        }
    }

    imageops::replace(&mut merged, below, 0, (above.height() + SEPARATOR_ROWS) as i64);
    merged
}
