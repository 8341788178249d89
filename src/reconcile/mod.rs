//! Text Reconciliation
//!
//! Turns an unordered set of OCR text blocks into a [`LabelRecord`]:
//! - Phase 1: position/quantity, cross-checked against the QR position (mandatory)
//! - Phases 2-4: product code, size and color, scanned forward in reading order
//! - Phase 5: rescan of unused blocks for any field still missing
//!
//! Product, size and color are accepted on an exact catalog hit or a fuzzy
//! match at or above the configured minimum score.

pub mod catalog;
pub mod fuzzy;
pub mod position;
pub mod record;

pub use catalog::Catalog;
pub use position::{find_position_quantity, PositionMatch, PositionRule};
pub use record::LabelRecord;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::config::ReconciliationSettings;
use crate::vision::ocr::TextBlock;
use crate::vision::qr::QrPayload;
use record::field;

/// Confidence factor for fields recovered by the out-of-order rescan
pub const FALLBACK_PENALTY: f32 = 0.8;

static PRODUCT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{3,9}$").expect("product pattern is a valid regex"));
static SIZE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9/-]{1,7}$").expect("size pattern is a valid regex"));
static COLOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z /]{3,}$").expect("color pattern is a valid regex"));

/// Catalog-backed label field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Product,
    Size,
    Color,
}

impl Field {
    const ALL: [Field; 3] = [Field::Product, Field::Size, Field::Color];

    fn key(self) -> &'static str {
        match self {
            Field::Product => field::PRODUCT_CODE,
            Field::Size => field::SIZE,
            Field::Color => field::COLOR,
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Field::Product => &PRODUCT_PATTERN,
            Field::Size => &SIZE_PATTERN,
            Field::Color => &COLOR_PATTERN,
        }
    }

    /// Block text as compared for this field; sizes and colors are uppercased
    fn normalize(self, text: &str) -> String {
        let text = text.trim();
        match self {
            Field::Product => text.to_string(),
            Field::Size | Field::Color => text.to_uppercase(),
        }
    }
}

/// Field value found in a specific block
#[derive(Debug, Clone)]
struct FieldHit {
    index: usize,
    value: String,
    confidence: f32,
}

/// Reconciles OCR output against the catalog and the QR payload
#[derive(Debug, Clone)]
pub struct TextReconciler {
    catalog: Catalog,
    min_fuzzy_score: f64,
}

impl TextReconciler {
    /// Create a reconciler over a loaded catalog
    pub fn new(catalog: Catalog, min_fuzzy_score: f64) -> Self {
        info!(
            "TextReconciler ready: {} products, {} sizes, {} colors (min fuzzy score {:.2})",
            catalog.products.len(),
            catalog.sizes.len(),
            catalog.colors.len(),
            min_fuzzy_score
        );
        Self {
            catalog,
            min_fuzzy_score,
        }
    }

    /// Create a reconciler from configuration, loading whichever tables are set
    pub fn from_settings(settings: &ReconciliationSettings) -> Self {
        let catalog = Catalog::load_or_empty(
            settings.products_path.as_deref(),
            settings.sizes_path.as_deref(),
            settings.colors_path.as_deref(),
        );
        Self::new(catalog, settings.min_fuzzy_score)
    }

    /// Build a label record from OCR blocks and the decoded QR
    ///
    /// If no position/quantity is found the record carries only QR fields
    /// and is invalid.
    pub fn reconcile(&self, blocks: &[TextBlock], qr: Option<&QrPayload>) -> LabelRecord {
        let mut record = LabelRecord::from_qr(qr);

        let mut sorted = blocks.to_vec();
        sorted.sort_by(|a, b| a.top().total_cmp(&b.top()));
        debug!("Reconciling {} text blocks", sorted.len());

        let Some(position) = find_position_quantity(&sorted, record.qr_position) else {
            info!("Position/quantity not found; record invalid");
            record.is_valid = false;
            return record;
        };

        let mut consumed = vec![false; sorted.len()];
        consumed[position.index] = true;
        record.position_quantity = position.text;
        record.ocr_position = position.position;
        record.quantity = position.quantity;
        record
            .field_confidences
            .insert(field::POSITION_QUANTITY.to_string(), position.confidence);

        // Phases 2-4: each field starts after the furthest field found so far
        let mut furthest = position.index;
        let mut hits: [Option<FieldHit>; 3] = [None, None, None];
        for (slot, kind) in Field::ALL.into_iter().enumerate() {
            if let Some(hit) = self.scan(&sorted, &consumed, kind, furthest + 1) {
                consumed[hit.index] = true;
                furthest = furthest.max(hit.index);
                hits[slot] = Some(hit);
            }
        }

        // Phase 5: out-of-order fields anywhere in the unused blocks
        for (slot, kind) in Field::ALL.into_iter().enumerate() {
            if hits[slot].is_some() {
                continue;
            }
            if let Some(mut hit) = self.scan(&sorted, &consumed, kind, 0) {
                debug!("{} recovered out of order: {:?}", kind.key(), hit.value);
                consumed[hit.index] = true;
                hit.confidence *= FALLBACK_PENALTY;
                hits[slot] = Some(hit);
            }
        }

        for (kind, hit) in Field::ALL.into_iter().zip(hits) {
            let Some(hit) = hit else { continue };
            record
                .field_confidences
                .insert(kind.key().to_string(), hit.confidence);
            match kind {
                Field::Product => record.product_code = hit.value,
                Field::Size => record.size = hit.value,
                Field::Color => record.color = hit.value,
            }
        }

        record.validate();
        info!(
            "Processed label: product={:?}, size={:?}, color={:?}, position={:?}, valid={}",
            record.product_code, record.size, record.color, record.position_quantity, record.is_valid
        );
        record
    }

    /// First unconsumed block at or after `start` that matches `kind`
    fn scan(&self, blocks: &[TextBlock], consumed: &[bool], kind: Field, start: usize) -> Option<FieldHit> {
        blocks
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(index, _)| !consumed[*index])
            .find_map(|(index, block)| {
                let (value, score) = self.match_field(kind, &block.text)?;
                Some(FieldHit {
                    index,
                    value,
                    confidence: block.confidence * score as f32,
                })
            })
    }

    /// Catalog value for `text`, with 1.0 for exact hits or the fuzzy score
    fn match_field(&self, kind: Field, text: &str) -> Option<(String, f64)> {
        let text = kind.normalize(text);
        if !kind.pattern().is_match(&text) {
            return None;
        }

        let values = match kind {
            Field::Product => &self.catalog.products,
            Field::Size => &self.catalog.sizes,
            Field::Color => &self.catalog.colors,
        };

        if let Some(exact) = values.iter().find(|v| v.eq_ignore_ascii_case(&text)) {
            debug!("Exact {} match: {:?}", kind.key(), exact);
            return Some((exact.clone(), 1.0));
        }

        let (matched, score) = fuzzy::best_match(&text, values.as_slice(), self.min_fuzzy_score);
        if matched.is_empty() {
            return None;
        }
        debug!(
            "Fuzzy {} match: {:?} -> {:?} (score {:.3})",
            kind.key(),
            text,
            matched,
            score
        );
        Some((matched.to_string(), score))
    }
}
