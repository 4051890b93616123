//! Overlay renderer.
//!
//! `render_overlay` is a pure function from the current geometry and the last
//! detector reply to an `OverlayScene` in display coordinates. `rasterize`
//! paints a scene onto a display-sized RGB frame.
//!
//! Box color precedence: collision (purple) > alert (red) > normal (green).

use image::{Rgb, RgbImage};

use crate::detect::{DetectionItem, DetectionResult};
use crate::geometry::{DisplayRect, DisplaySize, NativeCrop, NativeSize, ScaleFactors};
use crate::roi::RoiRect;

pub const ROI_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const NORMAL_COLOR: Rgb<u8> = Rgb([0x00, 0xFF, 0x00]);
pub const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const COLLISION_COLOR: Rgb<u8> = Rgb([0xCC, 0x00, 0xFF]);
pub const CAUTION_COLOR: Rgb<u8> = Rgb([255, 165, 0]);

const BANNER_WIDTH: f64 = 300.0;
const BANNER_HEIGHT: f64 = 50.0;
const BREACH_BANNER_Y: f64 = 50.0;
const COLLISION_BANNER_Y: f64 = 110.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxStatus {
    Normal,
    Alert,
    Collision,
}

impl BoxStatus {
    pub fn for_item(item: &DetectionItem, in_collision: bool) -> Self {
        if in_collision {
            BoxStatus::Collision
        } else if item.alert {
            BoxStatus::Alert
        } else {
            BoxStatus::Normal
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        match self {
            BoxStatus::Normal => NORMAL_COLOR,
            BoxStatus::Alert => ALERT_COLOR,
            BoxStatus::Collision => COLLISION_COLOR,
        }
    }

    pub fn stroke_width(&self) -> u32 {
        match self {
            BoxStatus::Normal => 2,
            BoxStatus::Alert | BoxStatus::Collision => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    pub rect: DisplayRect,
    pub status: BoxStatus,
    pub label: String,
    /// Whether to draw the `COLLISION` tag under the box.
    pub collision_tag: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerKind {
    Caution,
    Breach,
    Collision,
}

impl BannerKind {
    pub fn text(&self) -> &'static str {
        match self {
            BannerKind::Caution => "CAUTION",
            BannerKind::Breach => "BREACH",
            BannerKind::Collision => "COLLISION DETECTED",
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        match self {
            BannerKind::Caution => CAUTION_COLOR,
            BannerKind::Breach => ALERT_COLOR,
            BannerKind::Collision => COLLISION_COLOR,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Banner {
    pub kind: BannerKind,
    pub rect: DisplayRect,
}

impl Banner {
    fn centered(kind: BannerKind, display_width: f64) -> Self {
        let y = match kind {
            BannerKind::Caution | BannerKind::Breach => BREACH_BANNER_Y,
            BannerKind::Collision => COLLISION_BANNER_Y,
        };
        Self {
            kind,
            rect: DisplayRect::new(
                display_width / 2.0 - BANNER_WIDTH / 2.0,
                y,
                BANNER_WIDTH,
                BANNER_HEIGHT,
            ),
        }
    }
}

pub struct OverlayInput<'a> {
    pub display: DisplaySize,
    pub native: NativeSize,
    pub roi: Option<&'a RoiRect>,
    /// Rectangle being drawn, if any.
    pub draft: Option<DisplayRect>,
    pub result: Option<&'a DetectionResult>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayScene {
    pub roi: Option<DisplayRect>,
    pub draft: Option<DisplayRect>,
    pub boxes: Vec<DetectionBox>,
    pub banners: Vec<Banner>,
}

impl OverlayScene {
    pub fn has_banner(&self, kind: BannerKind) -> bool {
        self.banners.iter().any(|banner| banner.kind == kind)
    }
}

pub fn render_overlay(input: &OverlayInput<'_>) -> OverlayScene {
    let mut scene = OverlayScene {
        roi: input.roi.map(RoiRect::bounds),
        draft: input.draft.map(DisplayRect::normalized),
        ..OverlayScene::default()
    };
    let Some(result) = input.result else {
        return scene;
    };

    scene.boxes = detection_boxes(input, result);

    if result.confirmed_breach {
        scene
            .banners
            .push(Banner::centered(BannerKind::Breach, input.display.width));
    } else if result.breach {
        scene
            .banners
            .push(Banner::centered(BannerKind::Caution, input.display.width));
    }
    if result.has_collision() {
        scene
            .banners
            .push(Banner::centered(BannerKind::Collision, input.display.width));
    }
    scene
}

fn detection_boxes(input: &OverlayInput<'_>, result: &DetectionResult) -> Vec<DetectionBox> {
    let Ok(scale) = ScaleFactors::between(input.display, input.native) else {
        return Vec::new();
    };
    // Detections are relative to the crop that was sent.
    let (origin_x, origin_y) = match input.roi {
        Some(roi) => match NativeCrop::from_display(roi.bounds(), scale, input.native) {
            Ok(crop) => (f64::from(crop.x), f64::from(crop.y)),
            Err(err) => {
                log::debug!("roi has no native crop: {}", err);
                (0.0, 0.0)
            }
        },
        None => (0.0, 0.0),
    };

    let collision_ids = result.collision_track_ids();
    result
        .detections
        .iter()
        .map(|item| {
            let in_collision = item.in_collision(&collision_ids);
            let [x, y, w, h] = item.bbox;
            DetectionBox {
                rect: DisplayRect::new(
                    (x + origin_x) / scale.x,
                    (y + origin_y) / scale.y,
                    w / scale.x,
                    h / scale.y,
                ),
                status: BoxStatus::for_item(item, in_collision),
                label: item.caption(),
                collision_tag: in_collision,
            }
        })
        .collect()
}

/// Paint `scene` onto a display-sized frame. Text is not rendered.
pub fn rasterize(scene: &OverlayScene, canvas: &mut RgbImage) {
    if let Some(roi) = scene.roi {
        draw_outline(canvas, roi, ROI_COLOR, 2, false);
    }
    if let Some(draft) = scene.draft {
        draw_outline(canvas, draft, ROI_COLOR, 1, true);
    }
    for detection in &scene.boxes {
        draw_outline(
            canvas,
            detection.rect,
            detection.status.color(),
            detection.status.stroke_width(),
            false,
        );
    }
    for banner in &scene.banners {
        fill_rect(canvas, banner.rect, banner.kind.color());
    }
}

fn pixel_span(start: f64, extent: f64, limit: u32) -> Option<(u32, u32)> {
    let lo = start.floor().max(0.0);
    let hi = (start + extent).ceil().min(f64::from(limit));
    if hi <= lo {
        return None;
    }
    Some((lo as u32, hi as u32))
}

fn fill_rect(canvas: &mut RgbImage, rect: DisplayRect, color: Rgb<u8>) {
    let rect = rect.normalized();
    let (Some((x0, x1)), Some((y0, y1))) = (
        pixel_span(rect.x, rect.width, canvas.width()),
        pixel_span(rect.y, rect.height, canvas.height()),
    ) else {
        return;
    };
    for y in y0..y1 {
        for x in x0..x1 {
            canvas.put_pixel(x, y, color);
        }
    }
}

fn draw_outline(canvas: &mut RgbImage, rect: DisplayRect, color: Rgb<u8>, stroke: u32, dashed: bool) {
    let rect = rect.normalized();
    let stroke = f64::from(stroke);
    let edges = [
        DisplayRect::new(rect.x, rect.y, rect.width, stroke),
        DisplayRect::new(rect.x, rect.y + rect.height - stroke, rect.width, stroke),
        DisplayRect::new(rect.x, rect.y, stroke, rect.height),
        DisplayRect::new(rect.x + rect.width - stroke, rect.y, stroke, rect.height),
    ];
    for edge in edges {
        if !dashed {
            fill_rect(canvas, edge, color);
            continue;
        }
        let horizontal = edge.width >= edge.height;
        let length = if horizontal { edge.width } else { edge.height };
        let mut offset = 0.0;
        while offset < length {
            let dash = 4.0_f64.min(length - offset);
            let segment = if horizontal {
                DisplayRect::new(edge.x + offset, edge.y, dash, edge.height)
            } else {
                DisplayRect::new(edge.x, edge.y + offset, edge.width, dash)
            };
            fill_rect(canvas, segment, color);
            offset += 6.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(json: &str) -> DetectionResult {
        DetectionResult::parse(json).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn maps_detection_through_roi_origin() {
        let roi = RoiRect::new(1, DisplayRect::new(100.0, 50.0, 200.0, 100.0));
        let result = reply(
            r#"{"breach": false, "confirmed_breach": false, "count": 1, "detections": [
                {"label": "person", "confidence": 0.9, "bbox": [10, 10, 50, 50],
                 "distance_meters": 4, "alert": false}]}"#,
        );
        let scene = render_overlay(&OverlayInput {
            display: DisplaySize::new(640.0, 360.0),
            native: NativeSize::new(1920, 1080),
            roi: Some(&roi),
            draft: None,
            result: Some(&result),
        });

        let rect = scene.boxes[0].rect;
        assert!(approx(rect.x, 103.3));
        assert!(approx(rect.y, 53.3));
        assert!(approx(rect.width, 16.7));
        assert!(approx(rect.height, 16.7));
        assert_eq!(scene.boxes[0].status, BoxStatus::Normal);
        assert_eq!(scene.boxes[0].label, "person 4m");
        assert!(scene.banners.is_empty());
    }

    #[test]
    fn collision_overrides_alert() {
        let result = reply(
            r#"{"breach": true, "confirmed_breach": false, "collision": true,
                "collision_pairs": [[1, 2]], "count": 3, "detections": [
                {"label": "a", "confidence": 0.9, "bbox": [0,0,1,1], "distance_meters": 1, "alert": true, "track_id": 1},
                {"label": "b", "confidence": 0.9, "bbox": [0,0,1,1], "distance_meters": 1, "alert": true, "track_id": 7},
                {"label": "c", "confidence": 0.9, "bbox": [0,0,1,1], "distance_meters": 1, "alert": false}]}"#,
        );
        let scene = render_overlay(&OverlayInput {
            display: DisplaySize::new(640.0, 480.0),
            native: NativeSize::new(640, 480),
            roi: None,
            draft: None,
            result: Some(&result),
        });
        let statuses: Vec<_> = scene.boxes.iter().map(|b| b.status).collect();
        assert_eq!(
            statuses,
            [BoxStatus::Collision, BoxStatus::Alert, BoxStatus::Normal]
        );
        assert!(scene.boxes[0].collision_tag);
        assert_eq!(scene.boxes[1].status.stroke_width(), 4);
        assert_eq!(scene.boxes[2].status.stroke_width(), 2);
        assert!(scene.has_banner(BannerKind::Caution));
        assert!(scene.has_banner(BannerKind::Collision));
        assert!(!scene.has_banner(BannerKind::Breach));
    }

    #[test]
    fn confirmed_breach_replaces_caution() {
        let result = reply(
            r#"{"breach": true, "confirmed_breach": true, "count": 0, "detections": []}"#,
        );
        let scene = render_overlay(&OverlayInput {
            display: DisplaySize::new(800.0, 600.0),
            native: NativeSize::new(800, 600),
            roi: None,
            draft: None,
            result: Some(&result),
        });
        assert_eq!(scene.banners.len(), 1);
        assert_eq!(scene.banners[0].kind, BannerKind::Breach);
        assert_eq!(scene.banners[0].rect, DisplayRect::new(250.0, 50.0, 300.0, 50.0));
    }

    #[test]
    fn unknown_native_size_draws_no_boxes() {
        let result = reply(
            r#"{"breach": false, "confirmed_breach": false, "count": 1, "detections": [
                {"label": "x", "confidence": 0.5, "bbox": [1,1,1,1], "distance_meters": 2, "alert": false}]}"#,
        );
        let scene = render_overlay(&OverlayInput {
            display: DisplaySize::new(640.0, 480.0),
            native: NativeSize::ZERO,
            roi: None,
            draft: None,
            result: Some(&result),
        });
        assert!(scene.boxes.is_empty());
    }

    #[test]
    fn rasterize_paints_outlines_and_banners() {
        let scene = OverlayScene {
            roi: Some(DisplayRect::new(10.0, 10.0, 20.0, 20.0)),
            banners: vec![Banner::centered(BannerKind::Breach, 400.0)],
            ..OverlayScene::default()
        };
        let mut canvas = RgbImage::new(400, 200);
        rasterize(&scene, &mut canvas);
        assert_eq!(*canvas.get_pixel(10, 10), ROI_COLOR);
        assert_eq!(*canvas.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(200, 75), ALERT_COLOR);
    }
}
