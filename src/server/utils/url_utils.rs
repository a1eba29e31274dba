use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::server::error::{AppResult, Error};

/// url safe base64 without padding, what every rewritten manifest line carries
pub fn encode_proxied_url(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

/// accepts standard or url safe base64, padded or not. a `+` that turned into a space on the
/// way through a query string is put back as well
pub fn decode_proxied_url(encoded: &str) -> AppResult<String> {
    let normalized: String = encoded
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' | ' ' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|_| Error::BadRequest("url is not valid base64".to_string()))?;

    let url = String::from_utf8(bytes)
        .map_err(|_| Error::BadRequest("decoded url is not utf-8".to_string()))?;

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::BadRequest("Invalid URL format".to_string()));
    }

    Ok(url)
}

/// `{prefix}/proxy?url=<b64>&type=<class>`, prefix is empty for proxy relative urls
pub fn proxy_url(prefix: &str, target: &str, class: &str) -> String {
    format!(
        "{}/proxy?url={}&type={}",
        prefix.trim_end_matches('/'),
        encode_proxied_url(target),
        class
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn decodes_standard_padded_base64() {
        let url = "https://cdn.example/live/index.m3u8?a=1";
        let encoded = STANDARD.encode(url);

        assert_eq!(decode_proxied_url(&encoded).unwrap(), url);
    }

    #[test]
    fn decodes_plus_turned_space() {
        // ">>>" encodes to "Pj4+" in standard base64
        let url = "https://cdn.example/a?q=>>>";
        let encoded = STANDARD.encode(url).replace('+', " ");

        assert_eq!(decode_proxied_url(&encoded).unwrap(), url);
    }

    #[test]
    fn rejects_non_http_targets() {
        let encoded = encode_proxied_url("file:///etc/passwd");

        assert!(matches!(
            decode_proxied_url(&encoded),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn builds_relative_proxy_urls() {
        let url = proxy_url("", "https://cdn.example/seg1.ts", "segment");

        assert!(url.starts_with("/proxy?url="));
        assert!(url.ends_with("&type=segment"));
    }
}
