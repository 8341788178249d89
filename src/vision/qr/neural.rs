//! Grid-detector backend with super-resolution retry
//!
//! Detects finder patterns with rqrr. Small codes that fail to decode are
//! upscaled 2x (ONNX super-resolution model when configured, bicubic
//! otherwise) and tried again.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ort::value::TensorRef;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::{DecodedQr, QrDecoder};
use crate::vision::models::LazyModel;
use crate::vision::preprocess::{gray_to_nchw, nchw_to_gray};

/// Upscaling factor of the super-resolution step
const SR_FACTOR: u32 = 2;

/// rqrr-based QR backend
pub struct NeuralQrBackend {
    sr_model: Option<LazyModel>,
    sr_max_side: u32,
}

impl NeuralQrBackend {
    /// Create the backend; `sr_model` is loaded on first use
    pub fn new(sr_model: Option<PathBuf>, sr_max_side: u32) -> Self {
        Self {
            sr_model: sr_model.map(LazyModel::new),
            sr_max_side,
        }
    }

    /// 2x upscale of `image`
    fn super_resolve(&self, image: &GrayImage) -> GrayImage {
        if let Some(model) = self.sr_model.as_ref().filter(|m| m.is_available()) {
            match run_sr_model(model, image) {
                Ok(upscaled) => return upscaled,
                Err(e) => warn!("Super-resolution model failed, using bicubic: {:#}", e),
            }
        }
        imageops::resize(
            image,
            image.width() * SR_FACTOR,
            image.height() * SR_FACTOR,
            FilterType::CatmullRom,
        )
    }
}

impl QrDecoder for NeuralQrBackend {
    fn name(&self) -> &'static str {
        "neural"
    }

    fn decode(&self, image: &GrayImage) -> Result<Option<DecodedQr>> {
        if let Some(found) = detect_grid(image) {
            return Ok(Some(found));
        }

        let (w, h) = image.dimensions();
        if w == 0 || h == 0 || w.max(h) > self.sr_max_side {
            return Ok(None);
        }

        debug!("Retrying QR detection on {}x super-resolved copy", SR_FACTOR);
        let upscaled = self.super_resolve(image);
        let sx = w as f32 / upscaled.width() as f32;
        let sy = h as f32 / upscaled.height() as f32;

        Ok(detect_grid(&upscaled).map(|found| DecodedQr {
            corners: found.corners.map(|(x, y)| (x * sx, y * sy)),
            ..found
        }))
    }
}

/// First decodable grid in `image`
fn detect_grid(image: &GrayImage) -> Option<DecodedQr> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| image.get_pixel(x as u32, y as u32)[0],
    );

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => {
                let corners = grid.bounds.map(|p| (p.x as f32, p.y as f32));
                return Some(DecodedQr {
                    text: content,
                    corners,
                    confidence: 1.0,
                });
            }
            Err(e) => debug!("rqrr: grid found but not decodable: {:?}", e),
        }
    }

    None
}

/// Run the ONNX super-resolution model on a grayscale image
fn run_sr_model(model: &LazyModel, image: &GrayImage) -> Result<GrayImage> {
    let input = gray_to_nchw(image);

    model.with_session(|onnx| {
        let input_name = onnx.primary_input()?.to_string();
        let output_name = onnx.primary_output()?.to_string();

        let tensor = TensorRef::from_array_view(input.view())?;
        let outputs = onnx
            .session_mut()
            .run(ort::inputs![input_name.as_str() => tensor])?;
        let (shape, data) = outputs[output_name.as_str()].try_extract_tensor::<f32>()?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        let (out_h, out_w) = match dims.as_slice() {
            [.., h, w] if *h > 0 && *w > 0 => (*h as u32, *w as u32),
            _ => anyhow::bail!("Unexpected super-resolution output shape {:?}", dims),
        };
        nchw_to_gray(data, out_w, out_h).context("Super-resolution output too small")
    })
}
