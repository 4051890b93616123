use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use perimeter_roi::config::ClientConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PERIMETER_CONFIG",
        "PERIMETER_API_BASE_URL",
        "PERIMETER_DB_PATH",
        "PERIMETER_REFRESH_HZ",
        "PERIMETER_CAMERA_DEVICE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ClientConfig::load().expect("load defaults");
    assert_eq!(cfg.api_base_url, "http://127.0.0.1:8000");
    assert_eq!(cfg.db_path, "perimeter.db");
    assert_eq!(cfg.display.container_width, 1280);
    assert_eq!(cfg.display.container_height, 720);
    assert_eq!(cfg.display.refresh_hz, 60);
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!(cfg.jpeg_quality, 85);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    write!(
        file,
        r#"{{
            "api_base_url": "https://detector.example.com",
            "db_path": "site_a.db",
            "display": {{ "refresh_hz": 30 }},
            "camera": {{ "device": "/dev/video2", "width": 1280, "height": 720 }},
            "jpeg_quality": 70
        }}"#
    )
    .expect("write config");

    std::env::set_var("PERIMETER_CONFIG", file.path());
    std::env::set_var("PERIMETER_DB_PATH", "override.db");
    std::env::set_var("PERIMETER_REFRESH_HZ", "24");

    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.api_base_url, "https://detector.example.com");
    assert_eq!(cfg.db_path, "override.db");
    assert_eq!(cfg.display.refresh_hz, 24);
    assert_eq!(cfg.display.container_width, 1280);
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.jpeg_quality, 70);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    write!(
        file,
        r#"
api_base_url = "ws://10.0.0.5:8000"

[display]
container_width = 1920
container_height = 1080
"#
    )
    .expect("write config");
    std::env::set_var("PERIMETER_CONFIG", file.path());

    let cfg = ClientConfig::load().expect("load toml config");
    assert_eq!(cfg.api_base_url, "ws://10.0.0.5:8000");
    assert_eq!(cfg.display.container_width, 1920);
    assert_eq!(cfg.display.refresh_hz, 60);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PERIMETER_REFRESH_HZ", "0");
    assert!(ClientConfig::load().is_err());
    std::env::set_var("PERIMETER_REFRESH_HZ", "fast");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("PERIMETER_API_BASE_URL", "ftp://detector");
    let err = ClientConfig::load().unwrap_err();
    assert!(err.to_string().contains("api_base_url"));
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    write!(file, r#"{{ "camera": {{ "width": 0 }} }}"#).expect("write config");
    std::env::set_var("PERIMETER_CONFIG", file.path());
    assert!(ClientConfig::load().is_err());
    clear_env();
}
