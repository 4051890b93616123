//! Frame capture: crop the presented frame to the ROI and encode it as JPEG.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops;

use crate::geometry::{DisplaySize, NativeCrop, NativeSize};
use crate::media::MediaElement;
use crate::roi::RoiRect;

/// JPEG quality for outbound frames (0.85).
pub const JPEG_QUALITY: u8 = 85;

/// One encoded frame ready for the wire.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
    /// Native-space window the JPEG covers.
    pub crop: NativeCrop,
}

/// Crop the media's current frame to `roi` (or the full frame) and encode it.
///
/// Fails when the native size is unknown, the frame cannot be read, or
/// encoding fails. Callers treat every failure as frame-level.
pub fn capture(
    media: &mut dyn MediaElement,
    display: DisplaySize,
    native: NativeSize,
    roi: Option<&RoiRect>,
    quality: u8,
) -> Result<CapturedFrame> {
    let crop = NativeCrop::for_roi(roi.map(RoiRect::bounds), display, native)?;
    let frame = media.current_frame().context("read presented frame")?;
    let frame_size = NativeSize::new(frame.width(), frame.height());
    let crop = crop.clamp_to(frame_size).ok_or_else(|| {
        anyhow!(
            "crop origin ({}, {}) lies outside the {}x{} frame",
            crop.x,
            crop.y,
            frame_size.width,
            frame_size.height
        )
    })?;

    let region = imageops::crop_imm(&frame, crop.x, crop.y, crop.width, crop.height).to_image();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&region)
        .context("encode frame as jpeg")?;
    Ok(CapturedFrame { jpeg, crop })
}
