//! Position/quantity extraction
//!
//! The printed "position/quantity" token (e.g. `3/5`) is located with up to
//! four rules. Rules A to C are tried on each block in reading order and the
//! first block satisfying any of them wins. Rule D is a separate, more
//! permissive pass that only runs when nothing else matched.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::vision::ocr::TextBlock;

/// `position / quantity` with optional spaces around the divider
static POSITION_QUANTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*/\s*(\d+)$").expect("position/quantity pattern is a valid regex")
});

/// Characters OCR commonly produces in place of the `/` divider
pub const SEPARATOR_LOOKALIKES: [char; 8] = ['1', '|', 'l', 'I', '!', 't', 'i', 'j'];

/// Confidence factor when the divider was read as a lookalike character
pub const SEPARATOR_RECOVERY_PENALTY: f32 = 0.9;
/// Confidence factor when the divider was lost entirely
pub const MISSING_SEPARATOR_PENALTY: f32 = 0.85;
/// Confidence factor for matches found only by the permissive rescan
pub const RESCAN_PENALTY: f32 = 0.8;

/// Rule that produced a position/quantity match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRule {
    /// Literal `p/q`
    Exact,
    /// `p?q` where `?` is a divider lookalike
    SeparatorLookalike,
    /// `pq` with the divider missing, single-digit quantity
    MissingSeparator,
    /// Literal `p/q` surrounded by OCR noise
    Rescan,
}

/// Accepted position/quantity token
#[derive(Debug, Clone, PartialEq)]
pub struct PositionMatch {
    /// Index of the block in the sorted list
    pub index: usize,
    /// Text stored in the record
    pub text: String,
    pub position: u32,
    pub quantity: u32,
    /// Block confidence after the rule's penalty
    pub confidence: f32,
    pub rule: PositionRule,
}

/// Find position/quantity in blocks already sorted top to bottom
///
/// `qr_position` of 0 means the QR position is unknown; the lookalike and
/// missing-divider rules need it and are skipped.
pub fn find_position_quantity(blocks: &[TextBlock], qr_position: u32) -> Option<PositionMatch> {
    for (index, block) in blocks.iter().enumerate() {
        let text = block.text.trim();

        if let Some(found) = match_exact(text, qr_position) {
            return Some(found.at(index, block.confidence));
        }
        if qr_position > 0 {
            if let Some(found) = match_separator_lookalike(text, qr_position) {
                return Some(found.at(index, block.confidence));
            }
            if let Some(found) = match_missing_separator(text, qr_position) {
                return Some(found.at(index, block.confidence));
            }
        }
    }

    for (index, block) in blocks.iter().enumerate() {
        let stripped = block
            .text
            .trim()
            .trim_matches(|c: char| !c.is_ascii_digit());
        if let Some(mut found) = match_exact(stripped, qr_position) {
            found.rule = PositionRule::Rescan;
            debug!("Position/quantity found on rescan: {:?}", block.text);
            return Some(found.at(index, block.confidence));
        }
    }

    None
}

/// Match before the block index and confidence are known
struct Candidate {
    text: String,
    position: u32,
    quantity: u32,
    rule: PositionRule,
}

impl Candidate {
    fn at(self, index: usize, block_confidence: f32) -> PositionMatch {
        let penalty = match self.rule {
            PositionRule::Exact => 1.0,
            PositionRule::SeparatorLookalike => SEPARATOR_RECOVERY_PENALTY,
            PositionRule::MissingSeparator => MISSING_SEPARATOR_PENALTY,
            PositionRule::Rescan => RESCAN_PENALTY,
        };
        PositionMatch {
            index,
            text: self.text,
            position: self.position,
            quantity: self.quantity,
            confidence: block_confidence * penalty,
            rule: self.rule,
        }
    }
}

fn match_exact(text: &str, qr_position: u32) -> Option<Candidate> {
    let caps = POSITION_QUANTITY.captures(text)?;
    let position: u32 = caps[1].parse().ok()?;
    let quantity: u32 = caps[2].parse().ok()?;

    if quantity < position {
        debug!(
            "Rejected position/quantity {:?}: quantity {} < position {}",
            text, quantity, position
        );
        return None;
    }
    if qr_position > 0 && position != qr_position {
        warn!("Position mismatch: OCR={}, QR={}", position, qr_position);
    }

    Some(Candidate {
        text: text.to_string(),
        position,
        quantity,
        rule: PositionRule::Exact,
    })
}

fn match_separator_lookalike(text: &str, qr_position: u32) -> Option<Candidate> {
    let rest = text.strip_prefix(qr_position.to_string().as_str())?;
    let mut chars = rest.chars();
    let separator = chars.next()?;
    if !SEPARATOR_LOOKALIKES.contains(&separator) {
        return None;
    }
    let quantity = parse_digits(chars.as_str())?;
    if quantity < qr_position {
        return None;
    }

    let recovered = format!("{}/{}", qr_position, quantity);
    info!(
        "Recovered position/quantity: {:?} -> {:?} (separator {:?})",
        text, recovered, separator
    );
    Some(Candidate {
        text: recovered,
        position: qr_position,
        quantity,
        rule: PositionRule::SeparatorLookalike,
    })
}

fn match_missing_separator(text: &str, qr_position: u32) -> Option<Candidate> {
    let rest = text.strip_prefix(qr_position.to_string().as_str())?;
    if rest.chars().count() != 1 {
        return None;
    }
    let quantity = parse_digits(rest)?;
    if quantity < qr_position {
        return None;
    }

    let recovered = format!("{}/{}", qr_position, quantity);
    info!("Recovered position/quantity without divider: {:?} -> {:?}", text, recovered);
    Some(Candidate {
        text: recovered,
        position: qr_position,
        quantity,
        rule: PositionRule::MissingSeparator,
    })
}

/// Non-empty run of ASCII digits as a number
fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(texts: &[&str]) -> Vec<TextBlock> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| TextBlock::new(*t, 1.0, vec![(0.0, i as f32 * 10.0)]))
            .collect()
    }

    #[test]
    fn test_exact_match() {
        let found = find_position_quantity(&blocks(&["VA-S-002410-1", "1/1"]), 1).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.text, "1/1");
        assert_eq!((found.position, found.quantity), (1, 1));
        assert_eq!(found.rule, PositionRule::Exact);
        assert_eq!(found.confidence, 1.0);
    }

    #[test]
    fn test_exact_match_allows_spaces() {
        let found = find_position_quantity(&blocks(&["2 / 4"]), 0).unwrap();
        assert_eq!((found.position, found.quantity), (2, 4));
    }

    #[test]
    fn test_quantity_below_position_rejected() {
        let found = find_position_quantity(&blocks(&["5/3", "2/4"]), 0).unwrap();
        assert_eq!(found.text, "2/4");
        assert!(find_position_quantity(&blocks(&["5/3"]), 0).is_none());
    }

    #[test]
    fn test_mismatched_qr_still_accepted() {
        let found = find_position_quantity(&blocks(&["3/5"]), 2).unwrap();
        assert_eq!(found.position, 3);
        assert_eq!(found.rule, PositionRule::Exact);
    }

    #[test]
    fn test_separator_lookalike_recovery() {
        for text in ["313", "3|3", "3l4", "3I3", "3!5", "3t3", "3i3", "3j3"] {
            let found = find_position_quantity(&blocks(&[text]), 3).unwrap();
            assert_eq!(found.rule, PositionRule::SeparatorLookalike, "{text}");
            assert_eq!(found.position, 3);
            assert!((found.confidence - SEPARATOR_RECOVERY_PENALTY).abs() < 1e-6);
        }
        let found = find_position_quantity(&blocks(&["2|15"]), 2).unwrap();
        assert_eq!(found.text, "2/15");
        assert_eq!(found.quantity, 15);
    }

    #[test]
    fn test_lookalike_needs_known_position() {
        assert!(find_position_quantity(&blocks(&["313"]), 0).is_none());
    }

    #[test]
    fn test_missing_separator_recovery() {
        let found = find_position_quantity(&blocks(&["35"]), 3).unwrap();
        assert_eq!(found.text, "3/5");
        assert_eq!(found.rule, PositionRule::MissingSeparator);
        assert!((found.confidence - MISSING_SEPARATOR_PENALTY).abs() < 1e-6);

        // Quantity below position, or more than one trailing digit
        assert!(find_position_quantity(&blocks(&["32"]), 3).is_none());
        assert!(find_position_quantity(&blocks(&["3x"]), 3).is_none());
    }

    #[test]
    fn test_rescan_strips_noise() {
        let found = find_position_quantity(&blocks(&["(1/2).", "ABC"]), 1).unwrap();
        assert_eq!(found.text, "1/2");
        assert_eq!(found.rule, PositionRule::Rescan);
        assert!((found.confidence - RESCAN_PENALTY).abs() < 1e-6);
    }

    #[test]
    fn test_earlier_block_wins_across_rules() {
        // Lookalike in the first block beats an exact match further down
        let found = find_position_quantity(&blocks(&["313", "3/3"]), 3).unwrap();
        assert_eq!(found.index, 0);
        assert_eq!(found.rule, PositionRule::SeparatorLookalike);
    }

    #[test]
    fn test_nothing_found() {
        assert!(find_position_quantity(&blocks(&["HELLO", "340"]), 0).is_none());
        assert!(find_position_quantity(&[], 1).is_none());
    }
}
