use anyhow::{anyhow, Context, Result};
use url::Url;

/// Path of the detector WebSocket, relative to the API base URL.
pub const DETECT_PATH: &str = "/api/v1/ws/detect";

/// Map an HTTP base URL onto its WebSocket scheme.
///
/// `https` becomes `wss` and `http` becomes `ws`; anything else is returned
/// unchanged.
pub fn to_ws_url(base: &str) -> String {
    let base = base.trim();
    if let Some(rest) = base.strip_prefix("https") {
        return format!("wss{}", rest);
    }
    if let Some(rest) = base.strip_prefix("http") {
        return format!("ws{}", rest);
    }
    base.to_string()
}

/// Detector endpoint for an API base URL.
pub fn detect_endpoint(api_base_url: &str) -> Result<Url> {
    let ws = to_ws_url(api_base_url);
    let joined = format!("{}{}", ws.trim_end_matches('/'), DETECT_PATH);
    let url = Url::parse(&joined).with_context(|| format!("invalid detector url {}", joined))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(anyhow!("unsupported detector scheme: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_http_schemes() {
        assert_eq!(to_ws_url("https://det.example.com"), "wss://det.example.com");
        assert_eq!(to_ws_url("http://127.0.0.1:8000"), "ws://127.0.0.1:8000");
        assert_eq!(to_ws_url("ws://already"), "ws://already");
    }

    #[test]
    fn appends_detect_path() {
        let url = detect_endpoint("http://127.0.0.1:8000/").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/api/v1/ws/detect");

        let url = detect_endpoint("https://det.example.com").unwrap();
        assert_eq!(url.as_str(), "wss://det.example.com/api/v1/ws/detect");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(detect_endpoint("ftp://host").is_err());
    }
}
