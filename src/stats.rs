//! Local statistics log.
//!
//! Counters and a newest-first event log kept as one JSON blob in the
//! key/value store. The streaming loop only sees `StatsRecorder`.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::storage::{lock, SharedStore};

pub const STATS_KEY: &str = "perimeter_detection_stats";
pub const MAX_LOGS: usize = 1000;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

/// Side-effect sink for session and detection events.
pub trait StatsRecorder {
    fn increment_detection(&mut self, count: usize) -> Result<()>;

    fn increment_alarm(&mut self) -> Result<()>;

    fn increment_video_session(&mut self, name: &str) -> Result<()>;

    fn increment_camera_session(&mut self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Alarm,
    Detection,
    VideoSession,
    CameraSession,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Alarm => "alarm",
            LogKind::Detection => "detection",
            LogKind::VideoSession => "video_session",
            LogKind::CameraSession => "camera_session",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub details: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_alarms: u64,
    pub total_detections: u64,
    pub video_sessions: u64,
    pub camera_sessions: u64,
    pub logs: Vec<LogEntry>,
}

/// Lenient view of a stored blob: counters default, logs are checked apart.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredStats {
    total_alarms: u64,
    total_detections: u64,
    video_sessions: u64,
    camera_sessions: u64,
    logs: serde_json::Value,
}

impl Default for StoredStats {
    fn default() -> Self {
        Self {
            total_alarms: 0,
            total_detections: 0,
            video_sessions: 0,
            camera_sessions: 0,
            logs: serde_json::Value::Null,
        }
    }
}

impl DashboardStats {
    fn parse(blob: &str) -> Self {
        let stored: StoredStats = match serde_json::from_str(blob) {
            Ok(stored) => stored,
            Err(err) => {
                log::error!("failed to parse stored stats: {}", err);
                return Self::default();
            }
        };
        let logs = match stored.logs {
            serde_json::Value::Array(_) => {
                serde_json::from_value(stored.logs).unwrap_or_else(|err| {
                    log::warn!("discarding unreadable stats log: {}", err);
                    Vec::new()
                })
            }
            _ => Vec::new(),
        };
        Self {
            total_alarms: stored.total_alarms,
            total_detections: stored.total_detections,
            video_sessions: stored.video_sessions,
            camera_sessions: stored.camera_sessions,
            logs,
        }
    }

    fn push_log(&mut self, kind: LogKind, details: String) {
        let entry = LogEntry {
            id: generate_id(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
            details,
        };
        self.logs.insert(0, entry);
        self.logs.truncate(MAX_LOGS);
    }
}

fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}

pub struct StatsStore {
    store: SharedStore,
}

impl StatsStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> Result<DashboardStats> {
        let blob = lock(&self.store)?.get(STATS_KEY)?;
        Ok(blob
            .map(|blob| DashboardStats::parse(&blob))
            .unwrap_or_default())
    }

    pub fn reset(&mut self) -> Result<DashboardStats> {
        let stats = DashboardStats::default();
        self.save(&stats)?;
        Ok(stats)
    }

    fn save(&mut self, stats: &DashboardStats) -> Result<()> {
        let blob = serde_json::to_string(stats).context("serialize stats")?;
        lock(&self.store)?
            .set(STATS_KEY, &blob)
            .context("save stats")
    }

    fn update<F>(&mut self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut DashboardStats),
    {
        let mut stats = self.snapshot()?;
        apply(&mut stats);
        self.save(&stats)
    }
}

impl StatsRecorder for StatsStore {
    fn increment_detection(&mut self, count: usize) -> Result<()> {
        self.update(|stats| stats.total_detections += count as u64)
    }

    fn increment_alarm(&mut self) -> Result<()> {
        self.update(|stats| {
            stats.total_alarms += 1;
            stats.push_log(LogKind::Alarm, "Breach detected".to_string());
        })
    }

    fn increment_video_session(&mut self, name: &str) -> Result<()> {
        self.update(|stats| {
            stats.video_sessions += 1;
            stats.push_log(LogKind::VideoSession, format!("Started video: {}", name));
        })
    }

    fn increment_camera_session(&mut self) -> Result<()> {
        self.update(|stats| {
            stats.camera_sessions += 1;
            stats.push_log(
                LogKind::CameraSession,
                "Started live camera session".to_string(),
            );
        })
    }
}
