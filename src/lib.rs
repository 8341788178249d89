//! Label Reader - shipping label recognition
//!
//! Reads a detected label from a camera frame: rectifies it, decodes its QR
//! code, extracts the printed text regions and reconciles the OCR output
//! against the QR payload and a reference catalog.

pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod vision;

pub use config::AppConfig;
pub use error::{PipelineError, Stage};
pub use frame::LabelFrame;
pub use pipeline::{LabelOutput, LabelPipeline};
pub use reconcile::{Catalog, LabelRecord, TextReconciler};
