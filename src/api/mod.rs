//! REST client for the detection service.
//!
//! Every request goes through `ApiClient::request`, which attaches
//! `Authorization: Bearer <access_token>` when a token is stored.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use crate::storage::{lock, SharedStore};

pub const ACCESS_TOKEN_KEY: &str = "access_token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRead {
    pub id: i64,
    pub email: String,
    pub username: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdateProfileData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub current_password: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdatePasswordData {
    pub current_password: String,
    pub new_password: String,
}

/// Detector tuning stored by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub confidence_threshold: f64,
    pub alarm_threshold_meters: f64,
    pub focal_length: f64,
    pub breach_threshold_frames: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            alarm_threshold_meters: 1.5,
            focal_length: 850.0,
            breach_threshold_frames: 15,
        }
    }
}

impl SystemConfig {
    /// Apply `field=value` from the CLI.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<()> {
        let parse_err = || anyhow!("invalid value for {}: {}", field, value);
        match field {
            "confidence_threshold" => {
                self.confidence_threshold = value.parse().map_err(|_| parse_err())?
            }
            "alarm_threshold_meters" => {
                self.alarm_threshold_meters = value.parse().map_err(|_| parse_err())?
            }
            "focal_length" => self.focal_length = value.parse().map_err(|_| parse_err())?,
            "breach_threshold_frames" => {
                self.breach_threshold_frames = value.parse().map_err(|_| parse_err())?
            }
            other => return Err(anyhow!("unknown config field: {}", other)),
        }
        Ok(())
    }
}

pub fn validate_email(email: &str) -> Result<()> {
    static EMAIL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| {
        regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex")
    });
    if re.is_match(email) {
        Ok(())
    } else {
        Err(anyhow!("invalid email address: {}", email))
    }
}

pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
    store: SharedStore,
}

impl ApiClient {
    pub fn new(base_url: &str, store: SharedStore) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            store,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: &str, path: &str) -> Result<ureq::Request> {
        let mut request = self
            .agent
            .request(method, &format!("{}{}", self.base_url, path));
        if let Some(token) = lock(&self.store)?.get(ACCESS_TOKEN_KEY)? {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        Ok(request)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let response = self
            .request("POST", "/api/v1/token")?
            .send_form(&[("username", username), ("password", password)]);
        read_json(response, "login")
    }

    pub fn register(&self, request: &RegisterRequest) -> Result<UserRead> {
        validate_email(&request.email)?;
        let response = self.request("POST", "/api/v1/register")?.send_json(request);
        read_json(response, "register")
    }

    pub fn current_user(&self) -> Result<UserRead> {
        let response = self.request("GET", "/api/v1/users/me")?.call();
        read_json(response, "fetch current user")
    }

    pub fn update_profile_info(&self, data: &UpdateProfileData) -> Result<UserRead> {
        if data.current_password.is_empty() {
            return Err(anyhow!("current password is required to update profile"));
        }
        if let Some(email) = &data.email {
            validate_email(email)?;
        }
        let response = self
            .request("PUT", "/api/v1/users/me/profile")?
            .send_json(data);
        read_json(response, "update profile")
    }

    pub fn update_password(&self, data: &UpdatePasswordData) -> Result<serde_json::Value> {
        let response = self
            .request("PUT", "/api/v1/users/me/password")?
            .send_json(data);
        read_json(response, "update password")
    }

    pub fn get_config(&self) -> Result<SystemConfig> {
        let response = self.request("GET", "/api/v1/config")?.call();
        read_json(response, "fetch config")
    }

    pub fn save_config(&self, config: &SystemConfig) -> Result<()> {
        let response = self.request("POST", "/api/v1/config")?.send_json(config);
        check_status(response, "save config").map(|_| ())
    }

    pub fn backend_stats(&self) -> Result<serde_json::Value> {
        let response = self.request("GET", "/api/v1/stats")?.call();
        read_json(response, "fetch backend stats")
    }
}

fn check_status(
    response: std::result::Result<ureq::Response, ureq::Error>,
    action: &str,
) -> Result<ureq::Response> {
    match response {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(anyhow!("{} failed ({}): {}", action, code, error_detail(&body)))
        }
        Err(ureq::Error::Transport(err)) => Err(anyhow!("{} failed: {}", action, err)),
    }
}

fn read_json<T: DeserializeOwned>(
    response: std::result::Result<ureq::Response, ureq::Error>,
    action: &str,
) -> Result<T> {
    check_status(response, action)?
        .into_json()
        .with_context(|| format!("{}: unreadable response", action))
}

/// Prefer the service's `detail` (or `message`) field over the raw body.
fn error_detail(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = parsed.as_ref().and_then(|value| {
        value
            .get("detail")
            .or_else(|| value.get("message"))
            .cloned()
    });
    match field {
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
        None if body.trim().is_empty() => "no details".to_string(),
        None => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, InMemoryKvStore};

    #[test]
    fn email_shape_is_checked() {
        assert!(validate_email("ops@example.com").is_ok());
        assert!(validate_email("ops@example").is_err());
        assert!(validate_email("ops example.com").is_err());
    }

    #[test]
    fn system_config_defaults_and_fields() {
        let mut config = SystemConfig::default();
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.breach_threshold_frames, 15);

        config.set_field("focal_length", "900").unwrap();
        assert_eq!(config.focal_length, 900.0);
        assert!(config.set_field("focal_length", "far").is_err());
        assert!(config.set_field("gain", "1").is_err());
    }

    #[test]
    fn error_detail_prefers_service_message() {
        assert_eq!(error_detail(r#"{"detail": "Username taken"}"#), "Username taken");
        assert_eq!(error_detail(r#"{"message": "nope"}"#), "nope");
        assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_detail(""), "no details");
    }

    #[test]
    fn profile_update_requires_current_password() {
        let client = ApiClient::new("http://127.0.0.1:9", shared(InMemoryKvStore::default()));
        let err = client
            .update_profile_info(&UpdateProfileData {
                username: Some("ops".to_string()),
                email: None,
                current_password: String::new(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("current password"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://127.0.0.1:8000/", shared(InMemoryKvStore::default()));
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }
}
