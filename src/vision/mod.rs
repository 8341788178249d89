//! Vision Layer
//!
//! Geometric and image stages of the label pipeline:
//! - rectification (crop, deskew, orientation)
//! - enhancement (brightness/sharpness)
//! - QR location and decoding
//! - text region extraction around the QR anchor
//!
//! Detection and OCR engines are external; their interfaces live here too.

pub mod detection;
pub mod enhance;
pub mod geometry;
pub mod models;
pub mod ocr;
pub mod orientation;
pub mod preprocess;
pub mod qr;
pub mod rectify;
pub mod regions;

pub use detection::{Detection, LabelDetector, RecordedDetector};
pub use enhance::Enhancer;
pub use ocr::{RecordedRecognizer, TextBlock, TextRecognizer};
pub use orientation::{OnnxOrientationClassifier, OrientationClassifier, OrientationPrediction};
pub use qr::{QrDecoder, QrLocator, QrPayload};
pub use rectify::{RectifyResult, Rectifier};
pub use regions::{ComponentRegions, RegionExtractor};
