use thiserror::Error;

#[derive(Debug, Error)]
pub enum HexError {
    #[error("invalid hexadecimal string: {0}")]
    InvalidHex(String),
    #[error("odd-length hexadecimal string")]
    OddLength,
}

/// Normalises a hexadecimal string to the canonical relay representation:
/// lowercase, no `0x` prefix. Content is not validated.
pub fn normalize_hex(hex: &str) -> String {
    let stripped = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    stripped.to_ascii_lowercase()
}

/// Decodes a (possibly `0x`-prefixed, mixed-case) hexadecimal string.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, HexError> {
    let normalized = normalize_hex(hex);
    if normalized.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    hex::decode(&normalized).map_err(|_| HexError::InvalidHex(normalized))
}

/// Encodes bytes as canonical lowercase hex without prefix.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
