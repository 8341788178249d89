//! Pipeline abort reasons
//!
//! Expected per-frame failures are values, not panics. Each variant names the
//! stage that stopped the frame so QR problems can be told apart from OCR
//! quality problems.

use thiserror::Error;

/// Pipeline stage that produced an abort
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detection,
    Rectification,
    QrLocation,
    Ocr,
    Reconciliation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Detection => "detection",
            Stage::Rectification => "rectification",
            Stage::QrLocation => "qr location",
            Stage::Ocr => "ocr",
            Stage::Reconciliation => "reconciliation",
        };
        f.write_str(name)
    }
}

/// Reason a frame produced no label record
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no label detected")]
    NoDetection,

    #[error("label detector failed: {0:#}")]
    Detector(anyhow::Error),

    #[error("detection has no segmentation mask")]
    MissingMask,

    #[error("label contour unusable: {0}")]
    InvalidContour(String),

    #[error("rectification failed: {0}")]
    Rectification(String),

    #[error("no QR code detected")]
    QrNotFound,

    #[error("QR decoder failed: {0:#}")]
    QrBackend(anyhow::Error),

    #[error("OCR engine failed: {0:#}")]
    Ocr(anyhow::Error),

    #[error("position/quantity not found")]
    PositionQuantityNotFound,
}

impl PipelineError {
    /// Stage that aborted the frame
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::NoDetection
            | PipelineError::Detector(_)
            | PipelineError::MissingMask => Stage::Detection,
            PipelineError::InvalidContour(_) | PipelineError::Rectification(_) => {
                Stage::Rectification
            }
            PipelineError::QrNotFound | PipelineError::QrBackend(_) => Stage::QrLocation,
            PipelineError::Ocr(_) => Stage::Ocr,
            PipelineError::PositionQuantityNotFound => Stage::Reconciliation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(PipelineError::QrNotFound.stage(), Stage::QrLocation);
        assert_eq!(
            PipelineError::PositionQuantityNotFound.stage(),
            Stage::Reconciliation
        );
        assert_eq!(PipelineError::MissingMask.stage(), Stage::Detection);
        assert_eq!(
            PipelineError::Rectification("x".into()).stage(),
            Stage::Rectification
        );
    }

    #[test]
    fn test_messages_distinguish_reasons() {
        assert_eq!(PipelineError::QrNotFound.to_string(), "no QR code detected");
        assert_eq!(
            PipelineError::PositionQuantityNotFound.to_string(),
            "position/quantity not found"
        );
        let ocr = PipelineError::Ocr(anyhow::anyhow!("engine offline"));
        assert!(ocr.to_string().contains("engine offline"));
    }
}
