//! ROI geometry model.
//!
//! Holds zero or one rectangle in display space, the active tool, and the
//! gesture in progress. Committing a draw replaces the rectangle set
//! wholesale; there is never more than one region. Undo has a single level:
//! it returns to "no rectangle".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::geometry::{DisplayRect, Point};

/// Drags at or below this extent (either axis) are treated as clicks.
pub const MIN_DRAW_EXTENT: f64 = 2.0;

/// Prompt shown before the rectangle set is cleared.
pub const CLEAR_PROMPT: &str = "Clear ROI area?";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Draw,
    Move,
    Delete,
    #[default]
    None,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tool::Draw => "draw",
            Tool::Move => "move",
            Tool::Delete => "delete",
            Tool::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for Tool {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draw" => Ok(Tool::Draw),
            "move" => Ok(Tool::Move),
            "delete" => Ok(Tool::Delete),
            "none" => Ok(Tool::None),
            other => Err(anyhow::anyhow!(
                "unknown tool '{}'; expected draw, move, delete or none",
                other
            )),
        }
    }
}

/// The region of interest, in display pixels. Extents are never negative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiRect {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RoiRect {
    pub fn new(id: u64, bounds: DisplayRect) -> Self {
        let r = bounds.normalized();
        Self {
            id,
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }

    pub fn bounds(&self) -> DisplayRect {
        DisplayRect::new(self.x, self.y, self.width, self.height)
    }

    pub fn normalized(self) -> Self {
        Self::new(self.id, self.bounds())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
}

/// Mouse or touch input. Each touch point carries its own `pointer_id`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u32,
    pub phase: PointerPhase,
    pub point: Point,
}

impl PointerEvent {
    pub fn new(pointer_id: u32, phase: PointerPhase, x: f64, y: f64) -> Self {
        Self {
            pointer_id,
            phase,
            point: Point::new(x, y),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Gesture {
    /// Unnormalized preview; extents are `pointer - origin`.
    Draw { origin: Point, width: f64, height: f64 },
    Drag { id: u64, grab: Point },
}

#[derive(Debug)]
pub struct RoiModel {
    rect: Option<RoiRect>,
    tool: Tool,
    gesture: Option<Gesture>,
    active_pointer: Option<u32>,
    next_id: u64,
}

impl Default for RoiModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RoiModel {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1);
        Self {
            rect: None,
            tool: Tool::None,
            gesture: None,
            active_pointer: None,
            next_id: seed,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Replace the active tool. The rectangle is untouched.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    /// Toolbar semantics: picking the active tool again turns it off.
    pub fn select_tool(&mut self, tool: Tool) -> Tool {
        self.tool = if self.tool == tool { Tool::None } else { tool };
        self.tool
    }

    pub fn rectangle(&self) -> Option<&RoiRect> {
        self.rect.as_ref()
    }

    pub fn rectangles(&self) -> &[RoiRect] {
        self.rect.as_slice()
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.gesture, Some(Gesture::Draw { .. }))
    }

    /// Live preview of the rectangle being drawn, unnormalized.
    pub fn draft(&self) -> Option<DisplayRect> {
        match self.gesture {
            Some(Gesture::Draw {
                origin,
                width,
                height,
            }) => Some(DisplayRect::new(origin.x, origin.y, width, height)),
            _ => None,
        }
    }

    /// Open a zero-extent draft at `point`. Only valid with the draw tool.
    pub fn begin_draw(&mut self, point: Point) -> bool {
        if self.tool != Tool::Draw {
            return false;
        }
        self.gesture = Some(Gesture::Draw {
            origin: point,
            width: 0.0,
            height: 0.0,
        });
        true
    }

    pub fn update_draw(&mut self, point: Point) {
        if self.tool != Tool::Draw {
            return;
        }
        if let Some(Gesture::Draw {
            origin,
            width,
            height,
        }) = self.gesture.as_mut()
        {
            *width = point.x - origin.x;
            *height = point.y - origin.y;
        }
    }

    /// Finish the draft. Tiny drags are discarded as accidental clicks.
    pub fn commit_draw(&mut self) -> Option<RoiRect> {
        let Some(Gesture::Draw {
            origin,
            width,
            height,
        }) = self.gesture.take()
        else {
            return None;
        };
        if width.abs() <= MIN_DRAW_EXTENT || height.abs() <= MIN_DRAW_EXTENT {
            log::debug!("roi draft {}x{} discarded as a click", width, height);
            return None;
        }
        let id = self.allocate_id();
        let rect = RoiRect::new(id, DisplayRect::new(origin.x, origin.y, width, height));
        self.rect = Some(rect);
        Some(rect)
    }

    pub fn cancel_gesture(&mut self) {
        self.gesture = None;
        self.active_pointer = None;
    }

    pub fn move_rectangle(&mut self, id: u64, position: Point) -> bool {
        match self.rect.as_mut() {
            Some(rect) if rect.id == id => {
                rect.x = position.x;
                rect.y = position.y;
                *rect = rect.normalized();
                true
            }
            _ => false,
        }
    }

    pub fn delete_rectangle(&mut self, id: u64) -> bool {
        if self.rect.is_some_and(|rect| rect.id == id) {
            self.rect = None;
            true
        } else {
            false
        }
    }

    /// Empty the set after the caller confirms `CLEAR_PROMPT`.
    pub fn clear<F>(&mut self, confirm: F) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        if !confirm(CLEAR_PROMPT) {
            return false;
        }
        self.rect = None;
        true
    }

    pub fn undo(&mut self) {
        self.rect = None;
    }

    /// Drop the region without prompting. Used when the video source changes.
    pub fn reset(&mut self) {
        self.rect = None;
        self.cancel_gesture();
    }

    /// Route mouse/touch input. Only the first pointer down drives a gesture;
    /// additional touch points are ignored until it lifts.
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        match event.phase {
            PointerPhase::Down => {
                if self.active_pointer.is_some() {
                    return;
                }
                if self.pointer_down(event.point) {
                    self.active_pointer = Some(event.pointer_id);
                }
            }
            PointerPhase::Move => {
                if self.active_pointer != Some(event.pointer_id) {
                    return;
                }
                match self.gesture {
                    Some(Gesture::Draw { .. }) => self.update_draw(event.point),
                    Some(Gesture::Drag { id, grab }) => {
                        self.move_rectangle(
                            id,
                            Point::new(event.point.x - grab.x, event.point.y - grab.y),
                        );
                    }
                    None => {}
                }
            }
            PointerPhase::Up => {
                if self.active_pointer != Some(event.pointer_id) {
                    return;
                }
                self.active_pointer = None;
                if self.is_drawing() {
                    self.commit_draw();
                } else {
                    self.gesture = None;
                }
            }
            PointerPhase::Cancel => {
                if self.active_pointer == Some(event.pointer_id) {
                    self.cancel_gesture();
                }
            }
        }
    }

    fn pointer_down(&mut self, point: Point) -> bool {
        let hit = self.rect.filter(|rect| rect.bounds().contains(point));
        match (self.tool, hit) {
            (Tool::Delete, Some(rect)) => {
                self.delete_rectangle(rect.id);
                false
            }
            (Tool::Move | Tool::Draw, Some(rect)) => {
                self.gesture = Some(Gesture::Drag {
                    id: rect.id,
                    grab: Point::new(point.x - rect.x, point.y - rect.y),
                });
                true
            }
            (Tool::Draw, None) => self.begin_draw(point),
            _ => false,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(model: &mut RoiModel, from: (f64, f64), to: (f64, f64)) -> Option<RoiRect> {
        model.set_tool(Tool::Draw);
        model.begin_draw(Point::new(from.0, from.1));
        model.update_draw(Point::new(to.0, to.1));
        model.commit_draw()
    }

    #[test]
    fn commit_normalizes_and_replaces() {
        let mut model = RoiModel::new();
        let first = draw(&mut model, (10.0, 10.0), (60.0, 40.0)).unwrap();
        let second = draw(&mut model, (200.0, 150.0), (120.0, 100.0)).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(model.rectangles().len(), 1);
        let rect = model.rectangle().unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (120.0, 100.0, 80.0, 50.0));
    }

    #[test]
    fn small_drag_is_discarded() {
        let mut model = RoiModel::new();
        assert!(draw(&mut model, (10.0, 10.0), (12.0, 50.0)).is_none());
        assert!(draw(&mut model, (10.0, 10.0), (50.0, 8.0)).is_none());
        assert!(model.rectangle().is_none());
        assert!(!model.is_drawing());
    }

    #[test]
    fn draw_requires_draw_tool() {
        let mut model = RoiModel::new();
        model.set_tool(Tool::Move);
        assert!(!model.begin_draw(Point::new(1.0, 1.0)));
        assert!(model.draft().is_none());
    }

    #[test]
    fn draft_preview_is_unnormalized() {
        let mut model = RoiModel::new();
        model.set_tool(Tool::Draw);
        model.begin_draw(Point::new(50.0, 50.0));
        model.update_draw(Point::new(20.0, 30.0));
        assert_eq!(model.draft(), Some(DisplayRect::new(50.0, 50.0, -30.0, -20.0)));
    }

    #[test]
    fn select_tool_toggles() {
        let mut model = RoiModel::new();
        assert_eq!(model.select_tool(Tool::Draw), Tool::Draw);
        assert_eq!(model.select_tool(Tool::Draw), Tool::None);
        assert_eq!(model.select_tool(Tool::Move), Tool::Move);
        assert_eq!(model.select_tool(Tool::Delete), Tool::Delete);
    }

    #[test]
    fn move_and_delete_only_touch_matching_id() {
        let mut model = RoiModel::new();
        let rect = draw(&mut model, (0.0, 0.0), (30.0, 30.0)).unwrap();

        assert!(!model.move_rectangle(rect.id + 1, Point::new(5.0, 5.0)));
        assert!(model.move_rectangle(rect.id, Point::new(5.0, 6.0)));
        let moved = model.rectangle().unwrap();
        assert_eq!((moved.x, moved.y, moved.width), (5.0, 6.0, 30.0));

        assert!(!model.delete_rectangle(rect.id + 1));
        assert!(model.rectangle().is_some());
        assert!(model.delete_rectangle(rect.id));
        assert!(model.rectangle().is_none());
    }

    #[test]
    fn clear_needs_confirmation_and_undo_does_not() {
        let mut model = RoiModel::new();
        draw(&mut model, (0.0, 0.0), (30.0, 30.0));

        let mut prompt = String::new();
        assert!(!model.clear(|p| {
            prompt = p.to_string();
            false
        }));
        assert_eq!(prompt, CLEAR_PROMPT);
        assert!(model.rectangle().is_some());
        assert!(model.clear(|_| true));
        assert!(model.rectangle().is_none());

        draw(&mut model, (0.0, 0.0), (30.0, 30.0));
        model.undo();
        assert!(model.rectangle().is_none());
    }

    #[test]
    fn second_touch_does_not_hijack_draw() {
        let mut model = RoiModel::new();
        model.set_tool(Tool::Draw);
        model.handle_pointer(PointerEvent::new(1, PointerPhase::Down, 10.0, 10.0));
        model.handle_pointer(PointerEvent::new(2, PointerPhase::Down, 300.0, 300.0));
        model.handle_pointer(PointerEvent::new(2, PointerPhase::Move, 400.0, 400.0));
        model.handle_pointer(PointerEvent::new(1, PointerPhase::Move, 110.0, 60.0));
        model.handle_pointer(PointerEvent::new(2, PointerPhase::Up, 400.0, 400.0));
        assert!(model.is_drawing());
        model.handle_pointer(PointerEvent::new(1, PointerPhase::Up, 110.0, 60.0));

        let rect = model.rectangle().unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (10.0, 10.0, 100.0, 50.0));
    }

    #[test]
    fn drag_moves_existing_rect_and_delete_tool_removes_it() {
        let mut model = RoiModel::new();
        draw(&mut model, (10.0, 10.0), (60.0, 60.0));

        model.set_tool(Tool::Move);
        model.handle_pointer(PointerEvent::new(7, PointerPhase::Down, 20.0, 20.0));
        model.handle_pointer(PointerEvent::new(7, PointerPhase::Move, 120.0, 70.0));
        model.handle_pointer(PointerEvent::new(7, PointerPhase::Up, 120.0, 70.0));
        let rect = model.rectangle().unwrap();
        assert_eq!((rect.x, rect.y, rect.width), (110.0, 60.0, 50.0));

        model.set_tool(Tool::Delete);
        model.handle_pointer(PointerEvent::new(7, PointerPhase::Down, 0.0, 0.0));
        assert!(model.rectangle().is_some());
        model.handle_pointer(PointerEvent::new(7, PointerPhase::Down, 130.0, 80.0));
        assert!(model.rectangle().is_none());
    }

    #[test]
    fn tool_parses_from_cli_names() {
        assert_eq!("Draw".parse::<Tool>().unwrap(), Tool::Draw);
        assert!("erase".parse::<Tool>().is_err());
    }
}
