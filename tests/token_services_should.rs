use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use gateway::server::services::token_services::{
    PlaybackTokens, default_device_payload, generate_default_device_token, generate_guest_token,
};
use regex::Regex;
use serde_json::{Value, json};

#[test]
fn test_guest_token_is_uuid_shaped_hex() {
    let shape = Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap();

    let a = generate_guest_token();
    let b = generate_guest_token();

    assert!(shape.is_match(&a), "{}", a);
    assert!(shape.is_match(&b), "{}", b);
    assert_ne!(a, b);
}

#[test]
fn test_device_token_is_unsigned_and_decodes() {
    let token = generate_default_device_token();
    let parts: Vec<&str> = token.split('.').collect();

    assert_eq!(parts.len(), 3);
    assert!(parts[2].is_empty());
    assert!(!token.contains('=') && !token.contains('+') && !token.contains('/'));

    let header: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
    let payload: Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();

    assert_eq!(header, json!({ "alg": "none", "typ": "JWT" }));
    assert_eq!(payload, default_device_payload());
}

#[test]
fn test_playback_tokens_carry_all_three() {
    let tokens = PlaybackTokens::new("platform-abc".to_string());
    let payload = tokens.api_payload();

    assert_eq!(payload["x-access-token"], "platform-abc");
    assert_eq!(payload["X-Z5-Guest-Token"], tokens.guest_token.as_str());
    assert_eq!(payload["x-dd-token"], tokens.device_token.as_str());

    let headers = tokens.api_headers("https://www.zee5.com/", "TestAgent/1.0");
    assert_eq!(headers["origin"], "https://www.zee5.com");
    assert_eq!(headers["referer"], "https://www.zee5.com/");
    assert_eq!(headers["user-agent"], "TestAgent/1.0");
    assert_eq!(headers["x-access-token"], "platform-abc");
    assert_eq!(headers["x-z5-guest-token"], tokens.guest_token.as_str());
}
