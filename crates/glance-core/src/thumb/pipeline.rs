//! Decode → resize → encode pipeline producing base64 thumbnails.
//!
//! The pipeline is pure and stateless. It is split into three public steps
//! so the orchestrator can checkpoint between them; [`generate`] runs all
//! three back to back.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::{CoreError, CoreResult};

/// Longest thumbnail edge, in pixels, when nothing else is configured.
pub const DEFAULT_MAX_EDGE: u32 = 90;

/// JPEG quality used when nothing else is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Output formats a thumbnail can be re-encoded in.
///
/// A thumbnail is always encoded in the same family as its source; files
/// of any other format do not get a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewFormat {
    Png,
    Jpeg,
}

impl PreviewFormat {
    /// Resolves the output format from a lower-case, dot-less extension.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedFormat`] for anything but PNG and
    /// the JPEG family.
    pub fn from_extension(extension: &str) -> CoreResult<Self> {
        match extension {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" | "jpe" => Ok(Self::Jpeg),
            other => Err(CoreError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Target constraints for one thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub max_edge: u32,
    pub jpeg_quality: u8,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Computes thumbnail dimensions that keep the aspect ratio.
///
/// The longer edge becomes `max_edge`; the shorter one is rounded to the
/// nearest pixel and never drops below 1. Square images use `max_edge` for
/// both edges.
pub fn target_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let max = max_edge.max(1);
    if width == 0 || height == 0 {
        return (max, max);
    }

    let aspect = f64::from(width) / f64::from(height);
    let max_f = f64::from(max);
    let (new_width, new_height) = if aspect > 1.0 {
        (max_f, (max_f / aspect).round())
    } else {
        ((max_f * aspect).round(), max_f)
    };

    ((new_width as u32).max(1), (new_height as u32).max(1))
}

/// Decodes raw image bytes. The container format is sniffed from the
/// content, so a mislabelled file still decodes.
///
/// # Errors
///
/// Returns [`CoreError::Decode`] for corrupt or unrecognised bytes.
pub fn decode(bytes: &[u8]) -> CoreResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| CoreError::Decode(e.to_string()))
}

/// Resizes `image` to [`target_dimensions`] with a Lanczos3 filter.
pub fn resize(image: &DynamicImage, max_edge: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = target_dimensions(width, height, max_edge);
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Encodes `image` as `format` and returns the bytes as standard base64.
///
/// JPEG has no alpha channel, so transparency is flattened first.
///
/// # Errors
///
/// Returns [`CoreError::Encode`] if the encoder rejects the image.
pub fn encode(image: &DynamicImage, format: PreviewFormat, jpeg_quality: u8) -> CoreResult<String> {
    let mut buffer = Vec::new();

    match format {
        PreviewFormat::Png => image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| CoreError::Encode(e.to_string()))?,
        PreviewFormat::Jpeg => {
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality.clamp(1, 100));
            encoder
                .encode_image(&rgb)
                .map_err(|e| CoreError::Encode(e.to_string()))?;
        }
    }

    Ok(BASE64.encode(&buffer))
}

/// Runs the whole pipeline on `bytes`.
///
/// Returns either a complete base64 thumbnail or an error; never partial
/// output.
pub fn generate(bytes: &[u8], format: PreviewFormat, settings: &PipelineSettings) -> CoreResult<String> {
    let decoded = decode(bytes)?;
    let resized = resize(&decoded, settings.max_edge);
    encode(&resized, format, settings.jpeg_quality)
}
