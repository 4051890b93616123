//! V4L2 live camera backend.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;

use super::camera::CameraConstraints;
use super::mjpeg::decode_jpeg;
use crate::geometry::NativeSize;

pub(crate) struct V4l2Camera {
    device_path: String,
    state: V4l2State,
    size: NativeSize,
    mjpeg: bool,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub(crate) fn open(device_path: &str, constraints: CameraConstraints) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = constraints.width;
        format.height = constraints.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    device_path,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let mjpeg = format.fourcc == v4l::FourCC::new(b"MJPG");
        let size = NativeSize::new(format.width, format.height);

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Camera: opened {} ({}x{}{})",
            device_path,
            size.width,
            size.height,
            if mjpeg { ", mjpeg" } else { "" }
        );
        Ok(Self {
            device_path: device_path.to_string(),
            state,
            size,
            mjpeg,
        })
    }

    pub(crate) fn size(&self) -> NativeSize {
        self.size
    }

    pub(crate) fn next_frame(&mut self) -> Result<RgbImage> {
        use v4l::io::traits::CaptureStream;

        let mjpeg = self.mjpeg;
        let size = self.size;
        let buf = self
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .with_context(|| format!("capture v4l2 frame from {}", self.device_path))?;

        if mjpeg {
            return decode_jpeg(&buf);
        }
        let expected = size.width as usize * size.height as usize * 3;
        let pixels = buf
            .get(..expected)
            .ok_or_else(|| anyhow!("v4l2 frame is shorter than {} bytes", expected))?
            .to_vec();
        RgbImage::from_raw(size.width, size.height, pixels)
            .ok_or_else(|| anyhow!("v4l2 frame size mismatch"))
    }
}
