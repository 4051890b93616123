use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One detector reply.
///
/// `breach` is the instantaneous per-frame flag; `confirmed_breach` is the
/// detector's debounced alarm. Collision fields are optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub breach: bool,
    pub confirmed_breach: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_collision: Option<bool>,
    /// Pairs of track ids flagged as being in collision proximity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_pairs: Option<Vec<Vec<i64>>>,
    pub count: u32,
    pub detections: Vec<DetectionItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionItem {
    pub label: String,
    pub confidence: f64,
    /// `[x, y, w, h]` in native pixels, relative to the cropped region.
    pub bbox: [f64; 4],
    pub distance_meters: f64,
    pub alert: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i64>,
}

impl DetectionResult {
    /// Parse a detector message.
    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| anyhow!("malformed detection payload: {}", e))
    }

    pub fn has_collision(&self) -> bool {
        self.collision.unwrap_or(false)
    }

    /// Every track id that appears in any collision pair.
    pub fn collision_track_ids(&self) -> HashSet<i64> {
        self.collision_pairs
            .iter()
            .flatten()
            .flatten()
            .copied()
            .collect()
    }
}

impl DetectionItem {
    pub fn in_collision(&self, collision_ids: &HashSet<i64>) -> bool {
        self.track_id
            .is_some_and(|id| collision_ids.contains(&id))
    }

    /// Overlay caption, e.g. `person 3.5m`.
    pub fn caption(&self) -> String {
        format!("{} {}m", self.label, self.distance_meters)
    }
}
