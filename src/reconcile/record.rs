//! Reconciled label record

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vision::qr::QrPayload;

/// Field name keys used in [`LabelRecord::field_confidences`]
pub mod field {
    pub const POSITION_QUANTITY: &str = "positionQuantity";
    pub const PRODUCT_CODE: &str = "productCode";
    pub const SIZE: &str = "size";
    pub const COLOR: &str = "color";
}

/// Structured label data after reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelRecord {
    // From the QR payload
    pub full_order_code: String,
    pub date_code: String,
    pub facility: String,
    pub order_type: String,
    pub order_number: String,
    pub qr_position: u32,
    pub qr_revision_count: u32,

    // From OCR
    /// Canonical "position/quantity" text
    pub position_quantity: String,
    pub ocr_position: u32,
    pub quantity: u32,
    pub product_code: String,
    pub size: String,
    pub color: String,

    /// True only when the printed position matches the QR position
    pub is_valid: bool,
    /// Confidence per extracted field, after penalties
    pub field_confidences: BTreeMap<String, f32>,
}

impl LabelRecord {
    /// Record carrying only the QR-derived fields
    pub fn from_qr(qr: Option<&QrPayload>) -> Self {
        let mut record = Self::default();
        if let Some(qr) = qr {
            record.full_order_code = qr.raw_text.clone();
            record.date_code = qr.fields.date_code.clone();
            record.facility = qr.fields.facility.clone();
            record.order_type = qr.fields.order_type.clone();
            record.order_number = qr.fields.order_number.clone();
            record.qr_position = qr.fields.position;
            record.qr_revision_count = qr.fields.revision_count;
        }
        record
    }

    /// Recompute [`Self::is_valid`] from the position fields
    pub fn validate(&mut self) -> bool {
        self.is_valid = self.qr_position == self.ocr_position && self.ocr_position > 0;
        self.is_valid
    }

    /// True once Phase 1 found a position/quantity
    pub fn has_position(&self) -> bool {
        !self.position_quantity.is_empty()
    }

    /// Confidence of a named field, if extracted
    pub fn confidence(&self, field: &str) -> Option<f32> {
        self.field_confidences.get(field).copied()
    }
}
