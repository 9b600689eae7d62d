//! Text decoding for downloaded CSV bytes.
//!
//! Press controllers export in whatever encoding the HMI was configured
//! with, so UTF-8 is attempted first and Windows-1252 is the fallback.

use std::borrow::Cow;

use encoding_rs::WINDOWS_1252;

/// Decode CSV bytes as UTF-8, falling back to Windows-1252.
///
/// The fallback is a single-byte decoding in which every byte sequence is
/// valid, so this function cannot fail. A leading UTF-8 BOM is stripped.
pub fn decode_csv_bytes(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text.trim_start_matches('\u{feff}')),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text
        }
    }
}
