use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use tracing::debug;

/// encodings the proxy speaks in both directions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// picks what to send back based on the client's Accept-Encoding. hls players mostly send
    /// "gzip, deflate" or "identity" and identity has to be respected
    pub fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        match accept_encoding {
            Some(v) => {
                if v == "identity" || v.starts_with("identity,") {
                    return Self::None;
                }
                if v.contains("zstd") {
                    Self::Zstd
                } else if v.contains("gzip") {
                    Self::Gzip
                } else {
                    Self::None
                }
            }
            None => Self::None,
        }
    }

    /// what the upstream said it used, anything we can't undo counts as none
    pub fn from_content_encoding(content_encoding: Option<&str>) -> Self {
        match content_encoding.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("zstd") => Self::Zstd,
            Some("gzip") | Some("x-gzip") => Self::Gzip,
            _ => Self::None,
        }
    }

    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => {
                debug!("Decompressing zstd-encoded response");
                zstd::decode_all(data)
            }
            Self::Gzip => {
                debug!("Decompressing gzip-encoded response");
                let mut decoder = GzDecoder::new(data);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}
