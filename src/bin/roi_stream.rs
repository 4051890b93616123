//! roi_stream - crop a clip or camera to an ROI and stream it to the detector

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use image::codecs::jpeg::JpegEncoder;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use perimeter_roi::storage::shared;
use perimeter_roi::{
    detect_endpoint, AuthSession, ClientConfig, DeviceCameraProvider, DisplayRect, SqliteKvStore,
    StatsStore, StreamController, StreamState, VideoSourceManager, Workspace, WsConnector,
};

#[path = "../ui.rs"]
mod ui;

const SNAPSHOT_QUALITY: u8 = 90;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Clip to stream (MJPEG file, `stub://clip?...`, or any format with media-ffmpeg).
    #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
    source: Option<String>,
    /// Stream the configured camera instead of a clip.
    #[arg(long)]
    camera: bool,
    /// Camera device, overriding the config (`stub://camera`, `http://...`, `/dev/video0`).
    #[arg(long, env = "PERIMETER_CAMERA_DEVICE")]
    device: Option<String>,
    /// ROI in display pixels as `x,y,width,height`. Without it the full frame is sent.
    #[arg(long, value_name = "X,Y,W,H")]
    roi: Option<RoiArg>,
    /// Stop after this many seconds.
    #[arg(long)]
    max_seconds: Option<f64>,
    /// Write the last frame with its overlay to this JPEG file.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Clone, Copy, Debug)]
struct RoiArg(DisplayRect);

impl FromStr for RoiArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| anyhow!("ROI must be four numbers: x,y,width,height"))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(RoiArg(DisplayRect::new(*x, *y, *w, *h))),
            _ => Err(anyhow!("ROI must be four numbers: x,y,width,height")),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_flag(&args.ui, std::io::stderr().is_terminal());

    let mut cfg = ClientConfig::load()?;
    if let Some(device) = &args.device {
        cfg.camera.device = device.clone();
    }

    let store = {
        let _stage = ui.stage("Open local store");
        shared(SqliteKvStore::open(&cfg.db_path)?)
    };
    let session = AuthSession::restore(store.clone())?;
    let user = session.require_user()?;
    log::info!("operator: {}", user.username);

    let endpoint = detect_endpoint(&cfg.api_base_url)?;
    let controller = StreamController::new(endpoint, Box::new(WsConnector::default()))
        .with_jpeg_quality(cfg.jpeg_quality);
    let video = VideoSourceManager::new(Box::new(DeviceCameraProvider::new(
        cfg.camera.device.clone(),
    )))
    .with_constraints(cfg.camera.constraints());
    let stats = Box::new(StatsStore::new(store.clone()));
    let mut workspace = Workspace::new(video, controller, stats, cfg.display.container());

    {
        let _stage = ui.stage("Open video source");
        match &args.source {
            Some(path) => workspace.select_file(path)?,
            None => workspace.open_camera()?,
        }
        workspace.on_media_decoded();
    }
    let display = workspace.display();
    log::info!(
        "display {}x{} for native {}x{}",
        display.width,
        display.height,
        workspace.native_size().width,
        workspace.native_size().height
    );

    if let Some(RoiArg(rect)) = args.roi {
        if !workspace.set_roi(rect) {
            return Err(anyhow!("ROI {:?} is too small to draw", rect));
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    workspace.toggle_stream()?;
    let frame_interval = cfg.display.frame_interval();
    let started_at = Instant::now();
    let deadline = args.max_seconds.map(Duration::from_secs_f64);
    let mut status = ui.status_line();
    let mut was_streaming = false;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            log::info!("shutdown signal received");
            break;
        }
        if deadline.is_some_and(|limit| started_at.elapsed() >= limit) {
            log::info!("time limit reached");
            break;
        }
        workspace.tick();

        let state = workspace.controller().state();
        was_streaming |= state == StreamState::Streaming;
        status.update(&status_text(&workspace));

        match state {
            StreamState::Error => {
                log::error!("detector connection failed");
                break;
            }
            StreamState::Idle | StreamState::Connected if was_streaming => break,
            _ => {}
        }
        std::thread::sleep(frame_interval);
    }
    status.finish();

    if let Some(path) = &args.snapshot {
        let _stage = ui.stage("Write snapshot");
        let canvas = workspace.snapshot()?;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("create snapshot {}", path.display()))?;
        JpegEncoder::new_with_quality(&mut file, SNAPSHOT_QUALITY)
            .encode_image(&canvas)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        println!("snapshot written to {}", path.display());
    }

    let counters = workspace.controller().counters();
    println!(
        "frames sent: {}  replies: {}  skipped: {}  malformed: {}",
        counters.frames_sent,
        counters.results_received,
        counters.backpressure_skips,
        counters.malformed_results
    );
    let totals = StatsStore::new(store).snapshot()?;
    println!(
        "alarms: {}  detections: {}",
        totals.total_alarms, totals.total_detections
    );
    Ok(())
}

fn status_text(workspace: &Workspace) -> String {
    let counters = workspace.controller().counters();
    let mut text = format!("{}  sent {}", workspace.status(), counters.frames_sent);
    if let Some(playback) = workspace.playback_line() {
        text.push_str("  ");
        text.push_str(&playback);
    }
    if let Some(result) = workspace.controller().last_result() {
        text.push_str(&format!("  objects {}", result.count));
        if result.confirmed_breach {
            text.push_str("  BREACH");
        } else if result.breach {
            text.push_str("  CAUTION");
        }
    }
    text
}
