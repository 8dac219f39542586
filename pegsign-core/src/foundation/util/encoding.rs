use crate::foundation::{BridgeError, Hash32};

fn strip_hex_prefix(s: &str) -> &str {
    let trimmed = s.trim();
    trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed)
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>, BridgeError> {
    hex::decode(strip_hex_prefix(s)).map_err(|e| e.into())
}

pub fn parse_hex_32bytes(s: &str) -> Result<Hash32, BridgeError> {
    let bytes = decode_hex(s)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| BridgeError::EncodingError(format!("expected 32 bytes, got {}", len)))
}

/// Left-pads a big-endian integer encoding to 32 bytes.
pub fn left_pad_32(bytes: &[u8]) -> Result<Hash32, BridgeError> {
    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => &[],
    };
    if significant.len() > 32 {
        return Err(BridgeError::EncodingError(format!("value too large: {} bytes", significant.len())));
    }
    let mut out = [0u8; 32];
    out[32 - significant.len()..].copy_from_slice(significant);
    Ok(out)
}

/// Parses a decimal or `0x`-prefixed hex integer; `_` separators are allowed.
pub fn parse_u128(text: &str) -> Result<u128, BridgeError> {
    let text = text.trim().replace('_', "");
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => text.parse::<u128>(),
    };
    parsed.map_err(|err| BridgeError::EncodingError(format!("invalid integer '{}': {}", text, err)))
}
