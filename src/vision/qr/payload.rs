//! QR payload parsing and coordinate bookkeeping

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::vision::geometry::{polygon_to_bounds, PointI};

/// `MMDDYY-FACILITY-TYPE-ORDER-POSITION[/REVISION]`
static PAYLOAD_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{6})-([A-Z]{2})-([A-Z])-(\d+)-(\d+)(?:/(\d+))?$")
        .expect("payload grammar is a valid regex")
});

/// Order-tracking fields encoded in the QR text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFields {
    pub date_code: String,
    pub facility: String,
    pub order_type: String,
    pub order_number: String,
    pub position: u32,
    pub revision_count: u32,
}

impl OrderFields {
    /// Parse decoded QR text; `None` if it does not follow the grammar
    pub fn parse(text: &str) -> Option<Self> {
        let caps = PAYLOAD_GRAMMAR.captures(text.trim())?;
        let position = parse_saturating(&caps[5]);
        let revision_count = caps.get(6).map_or(0, |m| parse_saturating(m.as_str()));

        Some(Self {
            date_code: caps[1].to_string(),
            facility: caps[2].to_string(),
            order_type: caps[3].to_string(),
            order_number: caps[4].to_string(),
            position,
            revision_count,
        })
    }
}

/// Digit run as a number, clamped to `u32::MAX` when it overflows
fn parse_saturating(digits: &str) -> u32 {
    digits.parse().unwrap_or(u32::MAX)
}

/// Decoded QR code with its location in image coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    /// Decoded text as read
    pub raw_text: String,
    /// Corners in order top-left, top-right, bottom-right, bottom-left
    pub polygon: [PointI; 4],
    /// Axis-aligned bounds (x, y, width, height)
    pub bounding_rect: (i32, i32, i32, i32),
    /// Decoder confidence
    pub confidence: f32,
    /// Parsed fields, zero-valued when the text does not follow the grammar
    #[serde(flatten)]
    pub fields: OrderFields,
}

impl QrPayload {
    /// Build a payload from decoded text and corners, parsing the order fields
    ///
    /// A grammar mismatch is not a decode failure: the payload keeps its
    /// text and geometry with empty fields.
    pub fn new(raw_text: impl Into<String>, polygon: [PointI; 4], confidence: f32) -> Self {
        let raw_text = raw_text.into();
        let fields = OrderFields::parse(&raw_text).unwrap_or_else(|| {
            warn!("QR text {:?} does not match the order grammar", raw_text);
            OrderFields::default()
        });

        Self {
            bounding_rect: polygon_to_bounds(&polygon),
            raw_text,
            polygon,
            confidence,
            fields,
        }
    }

    /// Whether the text followed the order grammar
    pub fn is_structured(&self) -> bool {
        !self.fields.date_code.is_empty()
    }

    /// Label position encoded in the QR (0 when unknown)
    pub fn position(&self) -> u32 {
        self.fields.position
    }

    /// Map geometry from a scaled image back to the original image
    ///
    /// Coordinates are divided by `scale_factor` and truncated; text fields
    /// are left untouched.
    pub fn scale_back_coordinates(&self, scale_factor: f32) -> QrPayload {
        if scale_factor <= 0.0 || (scale_factor - 1.0).abs() < f32::EPSILON {
            return self.clone();
        }
        let unscale = |v: i32| (v as f32 / scale_factor) as i32;
        let (x, y, w, h) = self.bounding_rect;

        QrPayload {
            polygon: self.polygon.map(|(px, py)| (unscale(px), unscale(py))),
            bounding_rect: (unscale(x), unscale(y), unscale(w), unscale(h)),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [PointI; 4] = [(100, 50), (200, 50), (200, 150), (100, 150)];

    #[test]
    fn test_parse_without_revision() {
        let payload = QrPayload::new("110125-VA-M-000002-2", SQUARE, 1.0);
        assert_eq!(payload.fields.date_code, "110125");
        assert_eq!(payload.fields.facility, "VA");
        assert_eq!(payload.fields.order_type, "M");
        assert_eq!(payload.fields.order_number, "000002");
        assert_eq!(payload.fields.position, 2);
        assert_eq!(payload.fields.revision_count, 0);
        assert!(payload.is_structured());
    }

    #[test]
    fn test_parse_with_revision() {
        let payload = QrPayload::new("110125-VA-M-000002-2/1", SQUARE, 1.0);
        let plain = QrPayload::new("110125-VA-M-000002-2", SQUARE, 1.0);
        assert_eq!(payload.fields.revision_count, 1);
        assert_eq!(
            OrderFields {
                revision_count: 0,
                ..payload.fields.clone()
            },
            plain.fields
        );
    }

    #[test]
    fn test_grammar_mismatch_keeps_text_and_geometry() {
        for text in ["hello world", "11012-VA-M-000002-2", "110125-va-M-000002-2", ""] {
            let payload = QrPayload::new(text, SQUARE, 1.0);
            assert_eq!(payload.raw_text, text);
            assert_eq!(payload.fields, OrderFields::default());
            assert_eq!(payload.position(), 0);
            assert_eq!(payload.bounding_rect, (100, 50, 100, 100));
            assert!(!payload.is_structured());
        }
    }

    #[test]
    fn test_oversized_numbers_saturate() {
        let fields = OrderFields::parse("110125-VA-M-000002-99999999999/88888888888").unwrap();
        assert_eq!(fields.position, u32::MAX);
        assert_eq!(fields.revision_count, u32::MAX);
        assert_eq!(fields.order_number, "000002");
    }

    #[test]
    fn test_bounding_rect_from_polygon() {
        let payload = QrPayload::new("x", [(12, 40), (90, 35), (95, 110), (10, 115)], 1.0);
        assert_eq!(payload.bounding_rect, (10, 35, 85, 80));
    }

    #[test]
    fn test_scale_back_within_one_pixel() {
        let payload = QrPayload::new(
            "110125-VA-M-000002-2",
            [(37, 51), (141, 49), (143, 155), (35, 158)],
            1.0,
        );

        for f in [0.25f32, 0.5, 0.73, 1.6, 2.0, 3.3] {
            let scaled = payload.scale_back_coordinates(f);
            for (orig, back) in payload.polygon.iter().zip(scaled.polygon.iter()) {
                assert!((back.0 as f32 - orig.0 as f32 / f).abs() < 1.0);
                assert!((back.1 as f32 - orig.1 as f32 / f).abs() < 1.0);
            }
            assert_eq!(scaled.raw_text, payload.raw_text);
            assert_eq!(scaled.fields, payload.fields);
        }
    }

    #[test]
    fn test_scale_back_identity() {
        let payload = QrPayload::new("x", SQUARE, 1.0);
        assert_eq!(payload.scale_back_coordinates(1.0), payload);
    }

    #[test]
    fn test_serialized_field_names() {
        let payload = QrPayload::new("110125-VA-M-000002-2", SQUARE, 1.0);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["rawText"], "110125-VA-M-000002-2");
        assert_eq!(json["orderNumber"], "000002");
        assert_eq!(json["position"], 2);
    }
}
