//! Planar geometry helpers shared by rectification, QR anchoring and region carving

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;

/// Integer pixel coordinate
pub type PointI = (i32, i32);

/// Minimum-area rotated rectangle around a point set, as 4 corners
///
/// Returns `None` for an empty point set.
pub fn min_area_corners(points: &[PointI]) -> Option<[(f32, f32); 4]> {
    if points.is_empty() {
        return None;
    }
    let pts: Vec<Point<i32>> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
    let corners = min_area_rect(&pts);
    Some(corners.map(|p| (p.x as f32, p.y as f32)))
}

/// Order 4 corners as (top-left, top-right, bottom-right, bottom-left)
///
/// Corners are sorted by angle around their centroid, then rotated so the
/// corner with the smallest x+y sum comes first.
pub fn order_points(points: &[(f32, f32); 4]) -> [(f32, f32); 4] {
    let cx = points.iter().map(|p| p.0).sum::<f32>() / 4.0;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / 4.0;

    let mut sorted = *points;
    sorted.sort_by(|a, b| {
        let angle_a = (a.1 - cy).atan2(a.0 - cx);
        let angle_b = (b.1 - cy).atan2(b.0 - cx);
        angle_a.total_cmp(&angle_b)
    });

    let start = sorted
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.0 + a.1).total_cmp(&(b.0 + b.1)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    sorted.rotate_left(start);
    sorted
}

/// Euclidean distance between two points
pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// 2x3 affine transform `(x, y) -> (a*x + b*y + c, d*x + e*y + f)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2 {
    m: [f64; 6],
}

impl Affine2 {
    /// Solve the affine transform mapping each `from[i]` onto `to[i]`
    ///
    /// Returns `None` when the `from` triangle is degenerate.
    pub fn from_triangles(from: [(f64, f64); 3], to: [(f64, f64); 3]) -> Option<Self> {
        let [(x0, y0), (x1, y1), (x2, y2)] = from;
        let det = x0 * (y1 - y2) - y0 * (x1 - x2) + (x1 * y2 - x2 * y1);
        if det.abs() < 1e-9 {
            return None;
        }

        // Cramer's rule against [[x0 y0 1] [x1 y1 1] [x2 y2 1]]
        let solve = |v0: f64, v1: f64, v2: f64| -> (f64, f64, f64) {
            let a = (v0 * (y1 - y2) - y0 * (v1 - v2) + (v1 * y2 - v2 * y1)) / det;
            let b = (x0 * (v1 - v2) - v0 * (x1 - x2) + (x1 * v2 - x2 * v1)) / det;
            let c = (x0 * (y1 * v2 - y2 * v1) - y0 * (x1 * v2 - x2 * v1)
                + v0 * (x1 * y2 - x2 * y1))
                / det;
            (a, b, c)
        };

        let (a, b, c) = solve(to[0].0, to[1].0, to[2].0);
        let (d, e, f) = solve(to[0].1, to[1].1, to[2].1);
        Some(Self { m: [a, b, c, d, e, f] })
    }

    /// Map a point through the transform
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.m;
        (a * x + b * y + c, d * x + e * y + f)
    }
}

/// Axis-aligned bounds of a polygon as (x, y, width, height)
pub fn polygon_to_bounds(polygon: &[PointI]) -> (i32, i32, i32, i32) {
    if polygon.is_empty() {
        return (0, 0, 0, 0);
    }

    let min_x = polygon.iter().map(|p| p.0).min().unwrap_or(0);
    let min_y = polygon.iter().map(|p| p.1).min().unwrap_or(0);
    let max_x = polygon.iter().map(|p| p.0).max().unwrap_or(0);
    let max_y = polygon.iter().map(|p| p.1).max().unwrap_or(0);

    (min_x, min_y, max_x - min_x, max_y - min_y)
}

/// Absolute polygon area (shoelace formula)
pub fn polygon_area(points: &[PointI]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.0 as i64 * b.1 as i64 - b.0 as i64 * a.1 as i64)
        .sum();
    (twice as f64).abs() / 2.0
}

/// Largest outer contour of a binary mask
///
/// Any non-zero pixel counts as foreground. Returns `None` if the mask holds
/// no contour with at least 3 points.
pub fn mask_to_contour(mask: &GrayImage) -> Option<Vec<PointI>> {
    let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] > 0 {
            image::Luma([255u8])
        } else {
            image::Luma([0u8])
        }
    });

    find_contours::<i32>(&binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| c.points.iter().map(|p| (p.x, p.y)).collect::<Vec<PointI>>())
        .filter(|pts| pts.len() >= 3)
        .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)))
}
