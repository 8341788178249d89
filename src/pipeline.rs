//! Label pipeline
//!
//! Runs one frame through every stage in order:
//! mask contour, rectification, enhancement, QR location, region
//! extraction, OCR and reconciliation. Each stage completes before the next
//! starts; a hard failure stops the frame with a [`PipelineError`].

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info, info_span, warn};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::frame::LabelFrame;
use crate::reconcile::{LabelRecord, TextReconciler};
use crate::vision::detection::{filter_detections, Detection, LabelDetector};
use crate::vision::enhance::Enhancer;
use crate::vision::geometry::mask_to_contour;
use crate::vision::ocr::{upscale_for_ocr, TextRecognizer};
use crate::vision::orientation::OnnxOrientationClassifier;
use crate::vision::qr::{QrLocator, QrPayload};
use crate::vision::rectify::Rectifier;
use crate::vision::regions::{ComponentRegions, RegionExtractor};

/// Everything produced for a successfully processed frame
#[derive(Debug)]
pub struct LabelOutput {
    /// Id of the source frame
    pub frame_id: String,
    /// Reconciled label data
    pub record: LabelRecord,
    /// QR payload in rectified-image coordinates
    pub qr: QrPayload,
    /// Text regions around the QR code
    pub regions: ComponentRegions,
    /// Upright label crop
    pub rectified: RgbImage,
    /// Step-by-step rectification summary
    pub rectify_message: String,
    /// Wall time spent on the frame
    pub processing_time_ms: f64,
}

/// Per-frame label reading pipeline
pub struct LabelPipeline {
    rectifier: Rectifier,
    enhancer: Enhancer,
    qr: QrLocator,
    regions: RegionExtractor,
    reconciler: TextReconciler,
    min_ocr_dimension: u32,
    confidence_threshold: f32,
}

impl LabelPipeline {
    /// Build every stage from configuration
    pub fn from_config(config: &AppConfig) -> Self {
        let mut rectifier = Rectifier::new(config.rectifier.clone());
        if let Some(model) = &config.rectifier.orientation_model {
            rectifier = rectifier.with_classifier(Arc::new(OnnxOrientationClassifier::new(model.clone())));
        }

        let qr = QrLocator::new(config.qr.clone());
        info!("Label pipeline using {} QR backend", qr.backend_name());

        Self {
            rectifier,
            enhancer: Enhancer::new(config.enhancement.clone()),
            qr,
            regions: RegionExtractor::new(config.regions.clone()),
            reconciler: TextReconciler::from_settings(&config.reconciliation),
            min_ocr_dimension: config.ocr.min_dimension,
            confidence_threshold: config.detection.confidence_threshold,
        }
    }

    /// Replace the rectifier
    pub fn with_rectifier(mut self, rectifier: Rectifier) -> Self {
        self.rectifier = rectifier;
        self
    }

    /// Replace the QR locator
    pub fn with_qr_locator(mut self, qr: QrLocator) -> Self {
        self.qr = qr;
        self
    }

    /// Replace the reconciler
    pub fn with_reconciler(mut self, reconciler: TextReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Detect labels in the frame and process the most confident one at or
    /// above the threshold
    pub fn process_frame(
        &self,
        frame: &LabelFrame,
        detector: &mut dyn LabelDetector,
        ocr: &mut dyn TextRecognizer,
    ) -> Result<LabelOutput, PipelineError> {
        let detections = detector
            .detect(&frame.image)
            .map_err(PipelineError::Detector)?;
        let detection = filter_detections(detections, self.confidence_threshold)
            .into_iter()
            .next()
            .ok_or(PipelineError::NoDetection)?;
        self.process_detection(frame, &detection, ocr)
    }

    /// Run every stage on a single detection
    pub fn process_detection(
        &self,
        frame: &LabelFrame,
        detection: &Detection,
        ocr: &mut dyn TextRecognizer,
    ) -> Result<LabelOutput, PipelineError> {
        let span = info_span!("frame", id = %frame.id);
        let _enter = span.enter();
        let start = Instant::now();

        let result = self.run_stages(frame, detection, ocr, start);
        match &result {
            Ok(output) => info!(
                "Frame processed in {:.1}ms (valid: {})",
                output.processing_time_ms, output.record.is_valid
            ),
            Err(e) => warn!("Frame aborted at {} stage: {}", e.stage(), e),
        }
        result
    }

    fn run_stages(
        &self,
        frame: &LabelFrame,
        detection: &Detection,
        ocr: &mut dyn TextRecognizer,
        start: Instant,
    ) -> Result<LabelOutput, PipelineError> {
        let mask = detection.mask.as_ref().ok_or(PipelineError::MissingMask)?;
        let contour = mask_to_contour(mask).ok_or_else(|| {
            PipelineError::InvalidContour("mask has no usable outer contour".to_string())
        })?;
        debug!("Label contour with {} points", contour.len());

        let rectified = self.rectifier.process(&frame.image, &contour);
        debug!("Rectification: {}", rectified.message);
        let rectify_message = rectified.message;
        let rectified = match rectified.image {
            Some(image) if rectified.success => image,
            _ => return Err(PipelineError::Rectification(rectify_message)),
        };

        let enhanced = self.enhancer.enhance(&rectified);

        let qr = self
            .qr
            .detect(&enhanced)
            .map_err(PipelineError::QrBackend)?
            .ok_or(PipelineError::QrNotFound)?;

        let regions = self.regions.extract_and_merge(&enhanced, &qr.polygon);
        if regions.is_degraded() {
            debug!(
                "Region extraction degraded (above placeholder: {}, below placeholder: {})",
                regions.above_placeholder, regions.below_placeholder
            );
        }

        let (ocr_input, scale) = upscale_for_ocr(&regions.merged, self.min_ocr_dimension);
        let blocks: Vec<_> = ocr
            .recognize(&ocr_input)
            .map_err(PipelineError::Ocr)?
            .into_iter()
            .map(|block| block.unscaled(scale))
            .collect();
        debug!("OCR returned {} text blocks", blocks.len());

        let record = self.reconciler.reconcile(&blocks, Some(&qr));
        if !record.has_position() {
            return Err(PipelineError::PositionQuantityNotFound);
        }

        Ok(LabelOutput {
            frame_id: frame.id.clone(),
            record,
            qr,
            regions,
            rectified,
            rectify_message,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QrSettings, RectifierSettings};
    use crate::error::Stage;
    use crate::reconcile::Catalog;
    use crate::vision::detection::RecordedDetector;
    use crate::vision::ocr::{RecordedRecognizer, TextBlock};
    use crate::vision::qr::{DecodedQr, QrDecoder};
    use image::{GrayImage, Luma, Rgb};

    struct FixedDecoder(Option<&'static str>);

    impl QrDecoder for FixedDecoder {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn decode(&self, _image: &GrayImage) -> anyhow::Result<Option<DecodedQr>> {
            Ok(self.0.map(|text| DecodedQr {
                text: text.to_string(),
                corners: [(60.0, 30.0), (100.0, 30.0), (100.0, 70.0), (60.0, 70.0)],
                confidence: 1.0,
            }))
        }
    }

    struct FailingDetector;

    impl LabelDetector for FailingDetector {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            anyhow::bail!("model not loaded")
        }
    }

    struct FailingRecognizer;

    impl TextRecognizer for FailingRecognizer {
        fn recognize(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<TextBlock>> {
            anyhow::bail!("engine offline")
        }
    }

    fn pipeline(qr_text: Option<&'static str>) -> LabelPipeline {
        let mut config = AppConfig::default();
        config.rectifier = RectifierSettings {
            ai_orientation_fix: false,
            ..RectifierSettings::default()
        };
        let mut qr_settings = QrSettings::default();
        qr_settings.preprocessing.enabled = false;

        LabelPipeline::from_config(&config)
            .with_qr_locator(QrLocator::with_decoder(qr_settings, Box::new(FixedDecoder(qr_text))))
            .with_reconciler(TextReconciler::new(
                Catalog::new(["340"], ["3T"], ["MIDNIGHT"]),
                0.9,
            ))
    }

    fn frame() -> LabelFrame {
        LabelFrame::new(RgbImage::from_fn(200, 120, |x, y| {
            Rgb([(x % 250) as u8, (y * 2) as u8, 90])
        }))
    }

    fn detection() -> Detection {
        let mask = GrayImage::from_fn(200, 120, |x, y| {
            if (20..180).contains(&x) && (10..110).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        Detection {
            bounding_box: (20, 10, 180, 110),
            class_name: "label".to_string(),
            confidence: 0.9,
            mask: Some(mask),
        }
    }

    fn blocks(texts: &[&str]) -> RecordedRecognizer {
        RecordedRecognizer::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| TextBlock::new(*t, 0.9, vec![(0.0, i as f32 * 15.0)]))
                .collect(),
        )
    }

    #[test]
    fn test_full_frame() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let mut ocr = blocks(&["2/3", "340", "3T", "MIDNIGHT"]);

        let output = pipeline
            .process_frame(&frame(), &mut RecordedDetector::new(vec![detection()]), &mut ocr)
            .unwrap();

        assert!(output.record.is_valid);
        assert_eq!(output.record.position_quantity, "2/3");
        assert_eq!(output.record.product_code, "340");
        assert_eq!(output.record.color, "MIDNIGHT");
        assert_eq!(output.qr.position(), 2);
        assert!(output.rectified.width() >= output.rectified.height());
        assert!(output.rectify_message.contains("Step1"));
        assert!(output.regions.merged.width() > 0);
    }

    #[test]
    fn test_mismatched_position_is_produced_but_invalid() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let mut ocr = blocks(&["3/5"]);
        let output = pipeline
            .process_detection(&frame(), &detection(), &mut ocr)
            .unwrap();
        assert!(!output.record.is_valid);
        assert_eq!(output.record.ocr_position, 3);
    }

    #[test]
    fn test_no_qr_aborts() {
        let pipeline = pipeline(None);
        let err = pipeline
            .process_detection(&frame(), &detection(), &mut blocks(&["1/1"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::QrNotFound));
        assert_eq!(err.stage(), Stage::QrLocation);
    }

    #[test]
    fn test_missing_position_aborts() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let err = pipeline
            .process_detection(&frame(), &detection(), &mut blocks(&["HELLO"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::PositionQuantityNotFound));
        assert_eq!(err.stage(), Stage::Reconciliation);
    }

    #[test]
    fn test_missing_mask_aborts() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let mut no_mask = detection();
        no_mask.mask = None;
        let err = pipeline
            .process_detection(&frame(), &no_mask, &mut blocks(&["2/2"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingMask));
    }

    #[test]
    fn test_empty_mask_aborts_at_rectification() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let mut empty = detection();
        empty.mask = Some(GrayImage::new(200, 120));
        let err = pipeline
            .process_detection(&frame(), &empty, &mut blocks(&["2/2"]))
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Rectification);
    }

    #[test]
    fn test_low_confidence_detections_are_ignored() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let mut weak = detection();
        weak.confidence = 0.1;
        let err = pipeline
            .process_frame(
                &frame(),
                &mut RecordedDetector::new(vec![weak]),
                &mut blocks(&["2/2"]),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoDetection));
    }

    #[test]
    fn test_detector_failure_is_reported() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let err = pipeline
            .process_frame(&frame(), &mut FailingDetector, &mut blocks(&["2/2"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Detector(_)));
        assert_eq!(err.stage(), Stage::Detection);
    }

    #[test]
    fn test_empty_frame_aborts_at_rectification() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let empty = LabelFrame::new(RgbImage::new(0, 0));
        let err = pipeline
            .process_detection(&empty, &detection(), &mut blocks(&["2/2"]))
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Rectification);
        assert!(err.to_string().contains("Empty image"));
    }

    #[test]
    fn test_ocr_failure_is_reported() {
        let pipeline = pipeline(Some("110125-VA-M-000002-2"));
        let err = pipeline
            .process_detection(&frame(), &detection(), &mut FailingRecognizer)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Ocr);
    }
}
