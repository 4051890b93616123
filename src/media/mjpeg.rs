//! Motion-JPEG framing shared by clip files and HTTP cameras.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::Read;

pub(crate) const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Pulls whole JPEG images out of a multipart or raw MJPEG byte stream.
pub(crate) struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    pub(crate) fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    pub(crate) fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Byte ranges of every complete JPEG in `data`, in order.
pub(crate) fn split_jpeg_frames(data: &[u8]) -> Vec<(usize, usize)> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while let Some((start, end)) = find_jpeg_bounds(&data[offset..]) {
        frames.push((offset + start, offset + end));
        offset += end;
    }
    frames
}

/// First SOI..EOI span in `buffer`.
pub(crate) fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer
        .windows(2)
        .position(|pair| pair == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|pair| pair == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

pub(crate) fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .context("decode jpeg")?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fake_jpeg(body: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(body);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    #[test]
    fn splits_concatenated_frames() {
        let mut data = b"--boundary\r\n".to_vec();
        data.extend(fake_jpeg(b"one"));
        data.extend_from_slice(b"\r\n--boundary\r\n");
        data.extend(fake_jpeg(b"two!"));
        data.extend_from_slice(&[0xFF, 0xD8, 1, 2]);

        let frames = split_jpeg_frames(&data);
        assert_eq!(frames.len(), 2);
        assert_eq!(&data[frames[0].0..frames[0].1], fake_jpeg(b"one").as_slice());
        assert_eq!(&data[frames[1].0..frames[1].1], fake_jpeg(b"two!").as_slice());
    }

    #[test]
    fn stream_yields_frames_then_ends() {
        let mut data = fake_jpeg(b"a");
        data.extend(fake_jpeg(b"bb"));
        let mut stream = MjpegStream::new(Box::new(Cursor::new(data)));

        assert_eq!(stream.read_next_jpeg().unwrap(), fake_jpeg(b"a"));
        assert_eq!(stream.read_next_jpeg().unwrap(), fake_jpeg(b"bb"));
        assert!(stream.read_next_jpeg().is_err());
    }
}
