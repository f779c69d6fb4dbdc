//! Text encoders for the native boundary
//!
//! Two encodings are in play: the per-instance argument encoding (used for
//! init arguments, file names and control paths) and Latin-1, which the
//! library always expects for parameter names and string values and uses for
//! the default device list it returns.

use std::ffi::CString;

use crate::error::{GsError, Result};
use crate::types::ArgEncoding;

/// Encode `text` as a NUL-terminated native argument.
///
/// The returned buffer includes the terminator: one zero byte for
/// `Local`/`Utf8`, one zero 16-bit unit for `Utf16le`.
pub fn encode_arg(text: &str, encoding: ArgEncoding) -> Result<Vec<u8>> {
    if text.contains('\0') {
        return Err(GsError::Encoding(format!(
            "argument contains an interior NUL: {:?}",
            text
        )));
    }

    let bytes = match encoding {
        ArgEncoding::Local | ArgEncoding::Utf8 => {
            let mut bytes = Vec::with_capacity(text.len() + 1);
            bytes.extend_from_slice(text.as_bytes());
            bytes.push(0);
            bytes
        }
        ArgEncoding::Utf16le => {
            let mut bytes = Vec::with_capacity(text.len() * 2 + 2);
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_le_bytes());
            }
            bytes.extend_from_slice(&[0, 0]);
            bytes
        }
    };

    Ok(bytes)
}

/// Encode `text` as a NUL-terminated Latin-1 string
pub fn encode_latin1(text: &str) -> Result<CString> {
    let bytes = text
        .chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                GsError::Encoding(format!("{:?} is not representable in Latin-1 ({:?})", c, text))
            })
        })
        .collect::<Result<Vec<u8>>>()?;

    CString::new(bytes)
        .map_err(|e| GsError::Encoding(format!("Latin-1 string contains an interior NUL: {}", e)))
}

/// Decode Latin-1 bytes; every byte maps to the code point of the same value
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
