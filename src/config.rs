use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::capture::JPEG_QUALITY;
use crate::geometry::DisplaySize;
use crate::media::CameraConstraints;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_DB_PATH: &str = "perimeter.db";
const DEFAULT_CONTAINER_WIDTH: u32 = 1280;
const DEFAULT_CONTAINER_HEIGHT: u32 = 720;
const DEFAULT_REFRESH_HZ: u32 = 60;
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const MAX_REFRESH_HZ: u32 = 240;

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    api_base_url: Option<String>,
    db_path: Option<String>,
    display: Option<DisplayConfigFile>,
    camera: Option<CameraConfigFile>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    container_width: Option<u32>,
    container_height: Option<u32>,
    refresh_hz: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub db_path: String,
    pub display: DisplaySettings,
    pub camera: CameraSettings,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub container_width: u32,
    pub container_height: u32,
    pub refresh_hz: u32,
}

impl DisplaySettings {
    pub fn container(&self) -> DisplaySize {
        DisplaySize::new(
            f64::from(self.container_width),
            f64::from(self.container_height),
        )
    }

    /// Interval between animation frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl CameraSettings {
    pub fn constraints(&self) -> CameraConstraints {
        CameraConstraints {
            width: self.width,
            height: self.height,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_file(ClientConfigFile::default())
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PERIMETER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        let display = file.display.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        Self {
            api_base_url: file
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            display: DisplaySettings {
                container_width: display.container_width.unwrap_or(DEFAULT_CONTAINER_WIDTH),
                container_height: display
                    .container_height
                    .unwrap_or(DEFAULT_CONTAINER_HEIGHT),
                refresh_hz: display.refresh_hz.unwrap_or(DEFAULT_REFRESH_HZ),
            },
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            jpeg_quality: file.jpeg_quality.unwrap_or(JPEG_QUALITY),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PERIMETER_API_BASE_URL") {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("PERIMETER_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(device) = std::env::var("PERIMETER_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(hz) = std::env::var("PERIMETER_REFRESH_HZ") {
            self.display.refresh_hz = hz
                .trim()
                .parse()
                .map_err(|_| anyhow!("PERIMETER_REFRESH_HZ must be an integer frame rate"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| anyhow!("invalid api_base_url {}: {}", self.api_base_url, e))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(anyhow!(
                "api_base_url must use http, https, ws or wss: {}",
                self.api_base_url
            ));
        }
        if self.display.refresh_hz == 0 || self.display.refresh_hz > MAX_REFRESH_HZ {
            return Err(anyhow!(
                "refresh_hz must be between 1 and {}",
                MAX_REFRESH_HZ
            ));
        }
        if self.display.container_width == 0 || self.display.container_height == 0 {
            return Err(anyhow!("display container must be non-empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be non-zero"));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
