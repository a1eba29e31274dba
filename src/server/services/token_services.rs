// the locally generated tokens the secure playback api wants next to the platform token. none
// of these touch the network
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{Value, json};

/// header of the device details token, the platform accepts it unsigned
pub fn device_token_header() -> Value {
    json!({ "alg": "none", "typ": "JWT" })
}

/// the device/platform/capability blob the web player sends
pub fn default_device_payload() -> Value {
    json!({
        "schema_version": "1",
        "os_name": "N/A",
        "os_version": "N/A",
        "platform_name": "Chrome",
        "platform_version": "104",
        "device_name": "",
        "app_name": "Web",
        "app_version": "2.52.31",
        "player_capabilities": {
            "audio_channel": ["STEREO"],
            "video_codec": ["H264"],
            "container": ["MP4", "TS"],
            "package": ["DASH", "HLS"],
            "resolution": ["240p", "SD", "HD", "FHD"],
            "dynamic_range": ["SDR"]
        },
        "security_capabilities": {
            "encryption": ["WIDEVINE_AES_CTR"],
            "widevine_security_level": ["L3"],
            "hdcp_version": ["HDCP_V1", "HDCP_V2", "HDCP_V2_1", "HDCP_V2_2"]
        }
    })
}

/// random 8-4-4-4-12 lowercase hex id, shaped like a uuid but with no version bits
pub fn generate_guest_token() -> String {
    let hex = format!("{:032x}", rand::random::<u128>());
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// `base64url(header).base64url(payload).` with an empty signature segment
pub fn generate_device_token<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    // compact json, no spaces, the platform compares these byte for byte
    let header = serde_json::to_vec(&device_token_header())?;
    let payload = serde_json::to_vec(payload)?;

    Ok(format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    ))
}

pub fn generate_default_device_token() -> String {
    // a serde_json::Value always serializes
    generate_device_token(&default_device_payload()).unwrap_or_default()
}

/// the three tokens one secure playback call needs
#[derive(Debug, Clone)]
pub struct PlaybackTokens {
    pub platform_token: String,
    pub guest_token: String,
    pub device_token: String,
}

impl PlaybackTokens {
    pub fn new(platform_token: String) -> Self {
        Self {
            platform_token,
            guest_token: generate_guest_token(),
            device_token: generate_default_device_token(),
        }
    }

    pub fn api_payload(&self) -> Value {
        json!({
            "x-access-token": self.platform_token,
            "X-Z5-Guest-Token": self.guest_token,
            "x-dd-token": self.device_token,
        })
    }

    /// browser shaped headers for the api call, origin and referer point at the platform site
    pub fn api_headers(&self, platform_base_url: &str, user_agent: &str) -> HeaderMap {
        let origin = platform_base_url.trim_end_matches('/');
        let mut headers = HeaderMap::new();

        let pairs: [(HeaderName, String); 9] = [
            (header::ACCEPT, "application/json".to_string()),
            (header::ACCEPT_LANGUAGE, "en-US,en;q=0.9".to_string()),
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::ORIGIN, origin.to_string()),
            (header::REFERER, format!("{}/", origin)),
            (header::USER_AGENT, user_agent.to_string()),
            (
                HeaderName::from_static("x-access-token"),
                self.platform_token.clone(),
            ),
            (
                HeaderName::from_static("x-z5-guest-token"),
                self.guest_token.clone(),
            ),
            (
                HeaderName::from_static("x-dd-token"),
                self.device_token.clone(),
            ),
        ];

        for (name, value) in pairs {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(name, value);
            }
        }

        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));

        headers
    }
}
