//! FFmpeg-backed clip decoding.
//!
//! Frames are decoded sequentially. Seeking backwards reopens the input and
//! decodes forward again, which is adequate for short surveillance clips.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::geometry::NativeSize;

const AV_TIME_BASE: f64 = 1_000_000.0;
const FALLBACK_FPS: f64 = 25.0;

pub(crate) struct FfmpegClip {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    size: NativeSize,
    fps: f64,
    frame_count: u64,
    /// Index of the next frame the decoder will produce.
    next_index: u64,
}

impl FfmpegClip {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open clip '{}' with ffmpeg", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("clip has no video track"))?;
        let stream_index = input_stream.index();

        let mut fps = f64::from(input_stream.avg_frame_rate());
        if !fps.is_finite() || fps <= 0.0 {
            fps = FALLBACK_FPS;
        }
        let declared_frames = input_stream.frames();
        let duration = input.duration() as f64 / AV_TIME_BASE;
        let frame_count = if declared_frames > 0 {
            declared_frames as u64
        } else {
            (duration.max(0.0) * fps).round() as u64
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;
        let size = NativeSize::new(decoder.width(), decoder.height());

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            scaler,
            size,
            fps,
            frame_count,
            next_index: 0,
        })
    }

    pub(crate) fn fps(&self) -> f64 {
        self.fps
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn size(&self) -> NativeSize {
        self.size
    }

    pub(crate) fn frame_at(&mut self, index: u64) -> Result<RgbImage> {
        if index < self.next_index {
            log::debug!(
                "FfmpegClip: rewinding {} to frame {}",
                self.path.display(),
                index
            );
            *self = Self::open(&self.path)?;
        }
        loop {
            let frame = self.decode_next()?;
            if self.next_index > index {
                return Ok(frame);
            }
        }
    }

    fn decode_next(&mut self) -> Result<RgbImage> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded, &mut rgb_frame);
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded, &mut rgb_frame);
            }
        }

        anyhow::bail!("clip '{}' ended at frame {}", self.path.display(), self.next_index)
    }

    fn convert(
        &mut self,
        decoded: &ffmpeg::frame::Video,
        rgb_frame: &mut ffmpeg::frame::Video,
    ) -> Result<RgbImage> {
        self.scaler
            .run(decoded, rgb_frame)
            .context("scale frame to RGB")?;
        self.next_index += 1;
        frame_to_image(rgb_frame)
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    RgbImage::from_raw(width, height, pixels).ok_or_else(|| anyhow!("ffmpeg frame size mismatch"))
}
