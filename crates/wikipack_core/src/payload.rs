//! Stored page payloads.
//!
//! ## Payload Format
//!
//! ```text
//! | title_len (2, LE) | title (title_len) | document (rest) |
//! ```
//!
//! Title and document are UTF-8. When the archive is built with compression
//! the whole payload is gzip-compressed and the index records the length of
//! the compressed bytes.

use crate::error::{CoreError, CoreResult};
use crate::types::Location;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

const TITLE_LEN_SIZE: usize = 2;

/// How payload bytes are stored in segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Payloads are stored as-is.
    None,
    /// Payloads are gzip-compressed.
    #[default]
    Gzip,
}

impl Compression {
    /// Maps the `compressed_values` setting to a compression mode.
    #[must_use]
    pub fn from_flag(compressed: bool) -> Self {
        if compressed {
            Self::Gzip
        } else {
            Self::None
        }
    }

    /// Returns the value stored under `compressed_values`.
    #[must_use]
    pub fn is_compressed(self) -> bool {
        self == Self::Gzip
    }
}

/// A decoded page payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Page title.
    pub title: String,
    /// Rendered document.
    pub document: String,
}

/// Encodes a title and rendered document into segment bytes.
///
/// # Errors
///
/// Returns [`CoreError::EncodeFailed`] if the title does not fit the length
/// prefix or compression fails.
pub fn encode_payload(title: &str, document: &str, compression: Compression) -> CoreResult<Vec<u8>> {
    let title_len = u16::try_from(title.len()).map_err(|_| {
        CoreError::encode_failed(format!(
            "title is {} bytes, limit is {}",
            title.len(),
            u16::MAX
        ))
    })?;

    let mut raw = Vec::with_capacity(TITLE_LEN_SIZE + title.len() + document.len());
    raw.extend_from_slice(&title_len.to_le_bytes());
    raw.extend_from_slice(title.as_bytes());
    raw.extend_from_slice(document.as_bytes());

    match compression {
        Compression::None => Ok(raw),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(
                Vec::with_capacity(raw.len() / 2),
                flate2::Compression::default(),
            );
            encoder
                .write_all(&raw)
                .map_err(|e| CoreError::encode_failed(format!("gzip: {e}")))?;
            encoder
                .finish()
                .map_err(|e| CoreError::encode_failed(format!("gzip: {e}")))
        }
    }
}

/// Decodes segment bytes read from `location`.
///
/// # Errors
///
/// Returns [`CoreError::CorruptPayload`] if the bytes do not decompress or
/// do not hold a valid length-prefixed title.
pub fn decode_payload(bytes: &[u8], compression: Compression, location: Location) -> CoreResult<Page> {
    let raw = match compression {
        Compression::None => bytes.to_vec(),
        Compression::Gzip => {
            let mut raw = Vec::with_capacity(bytes.len() * 3);
            GzDecoder::new(bytes)
                .read_to_end(&mut raw)
                .map_err(|e| CoreError::corrupt_payload(location, format!("gzip: {e}")))?;
            raw
        }
    };

    if raw.len() < TITLE_LEN_SIZE {
        return Err(CoreError::corrupt_payload(location, "missing title length"));
    }
    let title_len = u16::from_le_bytes([raw[0], raw[1]]) as usize;
    let title_end = TITLE_LEN_SIZE + title_len;
    if raw.len() < title_end {
        return Err(CoreError::corrupt_payload(
            location,
            format!("title length {title_len} exceeds payload"),
        ));
    }

    let title = std::str::from_utf8(&raw[TITLE_LEN_SIZE..title_end])
        .map_err(|e| CoreError::corrupt_payload(location, format!("title: {e}")))?
        .to_string();
    let document = String::from_utf8(raw[title_end..].to_vec())
        .map_err(|e| CoreError::corrupt_payload(location, format!("document: {e}")))?;

    Ok(Page { title, document })
}
