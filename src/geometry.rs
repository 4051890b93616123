//! Display-space and native-space geometry.
//!
//! The user draws in display space (the scaled, on-screen video). Frames are
//! cropped and detections are reported in native space (the decoded frame's
//! pixel grid). Everything that crosses between the two goes through
//! `ScaleFactors` and `NativeCrop` so capture and rendering agree.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Padding subtracted from the container on each axis before fitting video.
pub const DISPLAY_PADDING: f64 = 40.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// On-screen size of the video surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Decoded pixel dimensions. `{0, 0}` until the media reports a decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeSize {
    pub width: u32,
    pub height: u32,
}

impl NativeSize {
    pub const ZERO: NativeSize = NativeSize {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        self.is_known()
            .then(|| f64::from(self.width) / f64::from(self.height))
    }
}

/// Axis-aligned rectangle in display space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Shift the origin so both extents are non-negative. Idempotent.
    pub fn normalized(self) -> Self {
        let x = if self.width < 0.0 {
            self.x + self.width
        } else {
            self.x
        };
        let y = if self.height < 0.0 {
            self.y + self.height
        } else {
            self.y
        };
        Self {
            x,
            y,
            width: self.width.abs(),
            height: self.height.abs(),
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        let r = self.normalized();
        point.x >= r.x && point.x <= r.x + r.width && point.y >= r.y && point.y <= r.y + r.height
    }
}

/// Native-per-display scale on each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    /// `native / display` on each axis. Fails until both sizes are known.
    pub fn between(display: DisplaySize, native: NativeSize) -> Result<Self> {
        if !native.is_known() {
            return Err(anyhow!("video native size is not available"));
        }
        if display.is_empty() {
            return Err(anyhow!(
                "display size is not available ({}x{})",
                display.width,
                display.height
            ));
        }
        Ok(Self {
            x: f64::from(native.width) / display.width,
            y: f64::from(native.height) / display.height,
        })
    }
}

/// Integer crop window in native pixels, always inside the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCrop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl NativeCrop {
    pub fn full(native: NativeSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: native.width,
            height: native.height,
        }
    }

    /// Map a display-space rectangle into native pixels.
    ///
    /// Origin and extents are floored; extents are at least one pixel and are
    /// clamped so the window never reaches past the native frame edge.
    pub fn from_display(rect: DisplayRect, scale: ScaleFactors, native: NativeSize) -> Result<Self> {
        let rect = rect.normalized();
        let x = (rect.x * scale.x).floor().max(0.0);
        let y = (rect.y * scale.y).floor().max(0.0);
        if x >= f64::from(native.width) || y >= f64::from(native.height) {
            return Err(anyhow!(
                "roi origin ({}, {}) lies outside the {}x{} frame",
                x,
                y,
                native.width,
                native.height
            ));
        }
        let x = x as u32;
        let y = y as u32;
        let width = (rect.width * scale.x).floor().max(1.0) as u32;
        let height = (rect.height * scale.y).floor().max(1.0) as u32;
        Ok(Self {
            x,
            y,
            width: width.min(native.width - x),
            height: height.min(native.height - y),
        })
    }

    /// Crop for an optional ROI; the full frame when there is none.
    pub fn for_roi(
        roi: Option<DisplayRect>,
        display: DisplaySize,
        native: NativeSize,
    ) -> Result<Self> {
        match roi {
            Some(rect) => {
                let scale = ScaleFactors::between(display, native)?;
                Self::from_display(rect, scale, native)
            }
            None if native.is_known() => Ok(Self::full(native)),
            None => Err(anyhow!("video native size is not available")),
        }
    }

    /// Shrink the window so it fits a frame of the given size.
    pub fn clamp_to(self, frame: NativeSize) -> Option<Self> {
        if self.x >= frame.width || self.y >= frame.height {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width: self.width.min(frame.width - self.x),
            height: self.height.min(frame.height - self.y),
        })
    }
}

/// Fit native aspect ratio inside the container, less padding.
///
/// Returns `None` while the native size is still unknown.
pub fn fit_display_size(container: DisplaySize, native: NativeSize) -> Option<DisplaySize> {
    let aspect = native.aspect_ratio()?;
    let max_width = (container.width - DISPLAY_PADDING).max(1.0);
    let max_height = (container.height - DISPLAY_PADDING).max(1.0);

    let mut width = max_width;
    let mut height = width / aspect;
    if height > max_height {
        height = max_height;
        width = height * aspect;
    }
    Some(DisplaySize { width, height })
}
